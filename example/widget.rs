//! floating assistant widget on an empty bevy scene.
//! - drag the green header or the round launcher to move it (position persists).
//! - click the launcher to open/close; quick actions only fill the prompt.
//! - type + enter to send. the backend defaults to http://localhost:8000/chat;
//!   override with ASSISTANT_ENDPOINT (see `WidgetConfig::from_env`).
//!
//! the view never mutates widget state directly: it writes `WidgetCommand`s and
//! redraws from `WidgetNotice`s.

use bevy::input::keyboard::{KeyCode, KeyboardInput};
use bevy::prelude::*;
use bevy::ui::ScrollPosition;
use bevy_assistant_widget::{
    AssistantWidget, AssistantWidgetPlugin, BackendStatus, DragSurface, RefreshBackendStatus,
    Role, UserIdentity, WidgetCommand, WidgetConfig, WidgetControl, WidgetNotice, WidgetPanel,
    WidgetRoot, WidgetSet,
};

const ACCENT: Color = Color::srgb(0.06, 0.72, 0.51);
const ACCENT_DARK: Color = Color::srgb(0.02, 0.59, 0.41);
const SURFACE: Color = Color::srgb(0.12, 0.12, 0.14);
const BACKGROUND: Color = Color::srgb(0.09, 0.09, 0.11);
const MUTED: Color = Color::srgb(0.65, 0.65, 0.7);

// ---------------------- ui tags ----------------------

#[derive(Component)]
struct MessageList;
#[derive(Component)]
struct ThinkingRow;
#[derive(Component)]
struct PromptText;
#[derive(Component)]
struct StatusText;
#[derive(Component)]
struct LauncherIcon;

#[derive(Component)]
struct BtnClose;
#[derive(Component)]
struct BtnSend;
#[derive(Component)]
struct BtnStatus;
#[derive(Component, Clone, Copy)]
struct BtnQuickAction(usize);

// ---------------------- main ----------------------

fn main() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    let identity = UserIdentity {
        user_id: std::env::var("ASSISTANT_USER_ID").ok(),
        role: std::env::var("ASSISTANT_ROLE").ok(),
    };

    App::new()
        .insert_resource(ClearColor(Color::srgb_u8(235, 237, 240)))
        .insert_resource(WidgetConfig::from_env())
        .insert_resource(identity)
        .add_plugins(DefaultPlugins)
        .add_plugins(AssistantWidgetPlugin)
        .add_systems(Startup, setup)
        // view -> widget commands land before the widget handles input
        .add_systems(
            Update,
            (handle_text_input, btn_close, btn_send, btn_quick_action, btn_status, btn_hover)
                .before(WidgetSet::Input),
        )
        // notice readers run after the widget emits them
        .add_systems(
            Update,
            (on_notices, refresh_status_text).after(WidgetSet::Drain),
        )
        .run();
}

// ---------------------- setup ui ----------------------

fn button_node(width: Val, height: Val) -> Node {
    Node {
        width,
        height,
        align_items: AlignItems::Center,
        justify_content: JustifyContent::Center,
        ..default()
    }
}

fn setup(
    mut commands: Commands,
    widget: Res<AssistantWidget>,
    identity: Res<UserIdentity>,
) {
    commands.spawn(Camera2d);

    let style_16 = TextFont { font_size: 16.0, ..default() };
    let style_14 = TextFont { font_size: 14.0, ..default() };
    let style_12 = TextFont { font_size: 12.0, ..default() };

    // root follows the anchor (bottom/right set by the plugin)
    commands
        .spawn((
            WidgetRoot,
            Node {
                position_type: PositionType::Absolute,
                flex_direction: FlexDirection::Column,
                align_items: AlignItems::FlexEnd,
                row_gap: Val::Px(16.0),
                ..default()
            },
            GlobalZIndex(2000),
        ))
        .with_children(|root| {
            // --- panel ---
            root.spawn((
                WidgetPanel,
                Node {
                    width: Val::Px(380.0),
                    height: Val::Px(520.0),
                    flex_direction: FlexDirection::Column,
                    overflow: Overflow::clip(),
                    display: Display::None,
                    ..default()
                },
                BackgroundColor(SURFACE),
                BorderRadius::all(Val::Px(16.0)),
            ))
            .with_children(|panel| {
                // header: drag handle with a close button inside
                panel
                    .spawn((
                        DragSurface::Header,
                        Node {
                            padding: UiRect::all(Val::Px(16.0)),
                            justify_content: JustifyContent::SpaceBetween,
                            align_items: AlignItems::Center,
                            ..default()
                        },
                        BackgroundColor(ACCENT),
                    ))
                    .with_children(|header| {
                        header
                            .spawn(Node {
                                column_gap: Val::Px(8.0),
                                align_items: AlignItems::Center,
                                ..default()
                            })
                            .with_children(|title| {
                                title.spawn((Text::new("Assistant"), style_16.clone(), TextColor(Color::WHITE)));
                                title.spawn((
                                    Text::new(identity.resolved_role().to_string()),
                                    style_12.clone(),
                                    TextColor(Color::WHITE),
                                    Node { padding: UiRect::axes(Val::Px(8.0), Val::Px(2.0)), ..default() },
                                    BackgroundColor(Color::srgba(1.0, 1.0, 1.0, 0.2)),
                                    BorderRadius::all(Val::Px(10.0)),
                                ));
                            });
                        header
                            .spawn((
                                Button,
                                WidgetControl,
                                BtnClose,
                                button_node(Val::Px(28.0), Val::Px(28.0)),
                                BackgroundColor(Color::NONE),
                            ))
                            .with_children(|b| {
                                b.spawn((Text::new("x"), style_16.clone(), TextColor(Color::WHITE)));
                            });
                    });

                // messages
                panel.spawn((
                    MessageList,
                    Node {
                        flex_grow: 1.0,
                        flex_direction: FlexDirection::Column,
                        row_gap: Val::Px(12.0),
                        padding: UiRect::all(Val::Px(16.0)),
                        overflow: Overflow::scroll_y(),
                        ..default()
                    },
                    ScrollPosition::default(),
                    BackgroundColor(BACKGROUND),
                ));

                // busy indicator
                panel.spawn((
                    ThinkingRow,
                    Text::new("Thinking..."),
                    style_14.clone(),
                    TextColor(MUTED),
                    Node {
                        display: Display::None,
                        padding: UiRect::axes(Val::Px(16.0), Val::Px(6.0)),
                        ..default()
                    },
                ));

                // quick actions
                panel
                    .spawn(Node {
                        padding: UiRect::axes(Val::Px(12.0), Val::Px(8.0)),
                        column_gap: Val::Px(8.0),
                        flex_wrap: FlexWrap::Wrap,
                        ..default()
                    })
                    .with_children(|row| {
                        for (idx, label) in widget.quick_actions().iter().enumerate() {
                            row.spawn((
                                Button,
                                WidgetControl,
                                BtnQuickAction(idx),
                                Node {
                                    padding: UiRect::axes(Val::Px(12.0), Val::Px(6.0)),
                                    ..default()
                                },
                                BackgroundColor(BACKGROUND),
                                BorderRadius::all(Val::Px(20.0)),
                            ))
                            .with_children(|b| {
                                b.spawn((Text::new(label.clone()), style_12.clone(), TextColor(MUTED)));
                            });
                        }
                    });

                // prompt + send
                panel
                    .spawn(Node {
                        padding: UiRect::all(Val::Px(12.0)),
                        column_gap: Val::Px(8.0),
                        align_items: AlignItems::Center,
                        ..default()
                    })
                    .with_children(|row| {
                        row.spawn((
                            PromptText,
                            Text::new("> "),
                            style_14.clone(),
                            TextColor(Color::WHITE),
                            Node { flex_grow: 1.0, ..default() },
                        ));
                        row.spawn((
                            Button,
                            WidgetControl,
                            BtnSend,
                            button_node(Val::Px(44.0), Val::Px(44.0)),
                            BackgroundColor(ACCENT),
                            BorderRadius::MAX,
                        ))
                        .with_children(|b| {
                            b.spawn((Text::new(">"), style_16.clone(), TextColor(Color::WHITE)));
                        });
                    });

                // backend status (click to re-check)
                panel
                    .spawn((
                        Button,
                        WidgetControl,
                        BtnStatus,
                        Node { padding: UiRect::axes(Val::Px(12.0), Val::Px(4.0)), ..default() },
                        BackgroundColor(Color::NONE),
                    ))
                    .with_children(|b| {
                        b.spawn((StatusText, Text::new("backend: checking..."), style_12.clone(), TextColor(MUTED)));
                    });
            });

            // --- launcher: drag to move, click to toggle ---
            root.spawn((
                Button,
                DragSurface::Launcher,
                button_node(Val::Px(60.0), Val::Px(60.0)),
                BackgroundColor(ACCENT),
                BorderRadius::MAX,
            ))
            .with_children(|b| {
                b.spawn((LauncherIcon, Text::new("?"), TextFont { font_size: 28.0, ..default() }, TextColor(Color::WHITE)));
            });
        });
}

// ---------------------- input & buttons ----------------------

fn handle_text_input(
    mut ev_kbd: EventReader<KeyboardInput>,
    keys: Res<ButtonInput<KeyCode>>,
    widget: Res<AssistantWidget>,
    mut commands_out: EventWriter<WidgetCommand>,
) {
    // prompt is inert while closed or while a reply is pending
    if !widget.is_open() || widget.is_sending() {
        ev_kbd.clear();
        return;
    }

    let mut draft = widget.input().to_string();
    for ev in ev_kbd.read() {
        if !ev.state.is_pressed() {
            continue;
        }
        if let Some(txt) = &ev.text {
            draft.push_str(&txt.replace(['\r', '\n'], ""));
        }
    }
    if keys.just_pressed(KeyCode::Backspace) {
        draft.pop();
    }
    if draft != widget.input() {
        commands_out.write(WidgetCommand::SetInput(draft));
    }
    if keys.just_pressed(KeyCode::Enter) && !keys.pressed(KeyCode::ShiftLeft) {
        commands_out.write(WidgetCommand::Submit);
    }
}

fn btn_close(
    q: Query<&Interaction, (Changed<Interaction>, With<BtnClose>)>,
    mut commands_out: EventWriter<WidgetCommand>,
) {
    for i in &q {
        if *i == Interaction::Pressed {
            commands_out.write(WidgetCommand::Close);
        }
    }
}

fn btn_send(
    q: Query<&Interaction, (Changed<Interaction>, With<BtnSend>)>,
    mut commands_out: EventWriter<WidgetCommand>,
) {
    for i in &q {
        if *i == Interaction::Pressed {
            commands_out.write(WidgetCommand::Submit);
        }
    }
}

fn btn_quick_action(
    q: Query<(&Interaction, &BtnQuickAction), Changed<Interaction>>,
    mut commands_out: EventWriter<WidgetCommand>,
) {
    for (i, BtnQuickAction(idx)) in &q {
        if *i == Interaction::Pressed {
            info!(target: "widget_demo", "quick action {}", idx);
            commands_out.write(WidgetCommand::QuickAction(*idx));
        }
    }
}

fn btn_status(
    q: Query<&Interaction, (Changed<Interaction>, With<BtnStatus>)>,
    mut refresh: EventWriter<RefreshBackendStatus>,
) {
    for i in &q {
        if *i == Interaction::Pressed {
            refresh.write(RefreshBackendStatus);
        }
    }
}

fn btn_hover(
    mut q: Query<(&Interaction, &mut BackgroundColor), (Changed<Interaction>, With<BtnSend>)>,
    widget: Res<AssistantWidget>,
) {
    for (i, mut bg) in &mut q {
        bg.0 = match *i {
            _ if widget.is_sending() || widget.input().trim().is_empty() => ACCENT.with_alpha(0.6),
            Interaction::Pressed | Interaction::Hovered => ACCENT_DARK,
            Interaction::None => ACCENT,
        };
    }
}

// ---------------------- notices ----------------------

fn on_notices(
    mut commands: Commands,
    mut ev: EventReader<WidgetNotice>,
    widget: Res<AssistantWidget>,
    mut q_list: Query<(Entity, &mut ScrollPosition), With<MessageList>>,
    mut q_thinking: Query<&mut Node, With<ThinkingRow>>,
    mut q_prompt: Query<&mut Text, (With<PromptText>, Without<LauncherIcon>)>,
    mut q_icon: Query<&mut Text, (With<LauncherIcon>, Without<PromptText>)>,
) {
    let Ok((list, mut scroll)) = q_list.single_mut() else {
        return;
    };
    for notice in ev.read() {
        match notice {
            WidgetNotice::MessageAppended { index } => {
                let Some(msg) = widget.conversation().messages().get(*index) else {
                    continue;
                };
                let (align, bg, fg) = match msg.role {
                    Role::User => (AlignSelf::FlexEnd, ACCENT, Color::WHITE),
                    Role::Assistant => (AlignSelf::FlexStart, SURFACE, Color::srgb(0.92, 0.92, 0.94)),
                };
                commands.entity(list).with_children(|p| {
                    p.spawn((
                        Node {
                            max_width: Val::Percent(80.0),
                            padding: UiRect::axes(Val::Px(16.0), Val::Px(12.0)),
                            align_self: align,
                            ..default()
                        },
                        BackgroundColor(bg),
                        BorderRadius::all(Val::Px(16.0)),
                    ))
                    .with_children(|bubble| {
                        bubble.spawn((
                            Text::new(msg.text.clone()),
                            TextFont { font_size: 14.0, ..default() },
                            TextColor(fg),
                        ));
                    });
                });
            }
            WidgetNotice::ScrollToLatest => {
                // layout clamps this to the content height
                scroll.offset_y = f32::MAX;
            }
            WidgetNotice::BusyChanged { sending } => {
                if let Ok(mut node) = q_thinking.single_mut() {
                    node.display = if *sending { Display::Flex } else { Display::None };
                }
            }
            WidgetNotice::InputChanged => {
                if let Ok(mut t) = q_prompt.single_mut() {
                    t.0 = format!("> {}", widget.input());
                }
            }
            WidgetNotice::VisibilityChanged { open } => {
                if let Ok(mut t) = q_icon.single_mut() {
                    t.0 = if *open { "x" } else { "?" }.to_string();
                }
            }
            WidgetNotice::AnchorMoved(anchor) => {
                debug!(target: "widget_demo", "anchor -> {:?}", anchor);
            }
        }
    }
}

fn refresh_status_text(status: Res<BackendStatus>, mut q: Query<&mut Text, With<StatusText>>) {
    if !status.is_changed() {
        return;
    }
    if let Ok(mut t) = q.single_mut() {
        t.0 = match &*status {
            BackendStatus::Unknown => "backend: checking...".to_string(),
            BackendStatus::Online => "backend: online".to_string(),
            BackendStatus::Offline(reason) => format!("backend: offline ({reason})"),
        };
    }
}
