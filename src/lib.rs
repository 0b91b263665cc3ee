//! bevy_assistant_widget: a floating, draggable assistant chat widget for bevy.
//!
//! - headless core (`widget`, `drag`, `format`, `position`) usable without an `App`.
//! - one POST per message to an assistant endpoint; replies are formatted to
//!   plain text by structural shape (records, confirmations, refusals, errors).
//! - anchor is edge-relative, clamped to the window and persisted on every move.
//! - never blocks the main thread: on native the exchange runs on a tiny tokio
//!   runtime; on wasm on bevy's async pool, which yields to the browser.
//!
//! the view is a pure subscriber: it writes [`WidgetCommand`]s and reads
//! [`WidgetNotice`]s. see `example/widget.rs` for a complete ui.

use bevy::prelude::*;
use bevy::tasks::AsyncComputeTaskPool;
use bevy::window::PrimaryWindow;
use flume::{Receiver, Sender};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

pub mod config;
pub mod conversation;
pub mod drag;
pub mod format;
pub mod position;
pub mod transport;
pub mod widget;

pub use config::{UserIdentity, WidgetConfig};
pub use conversation::{Conversation, Message, Role};
pub use drag::{DragController, DragRelease, DragSurface};
pub use format::{ReplyShape, classify, format_reply};
pub use position::{AnchorPosition, KeyValueStore, MemoryStore, PositionStore, StorageError};
pub use transport::{
    AssistantTransport, ChatPayload, HttpTransport, Transport, TransportError, async_trait,
};
pub use widget::{AssistantWidget, WidgetNotice};

/// on native we keep a tiny tokio runtime to drive exchanges.
/// we spawn onto this rt from compute tasks so neither the main thread
/// nor bevy's compute pools block.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Resource, Clone)]
pub struct TokioRt(pub Arc<tokio::runtime::Runtime>);

#[cfg(not(target_arch = "wasm32"))]
impl Default for TokioRt {
    fn default() -> Self {
        info!(target: "bevy_assistant_widget", "initializing Tokio multi-thread runtime (native)");
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("tokio runtime");
        Self(Arc::new(rt))
    }
}

/// system ordering so views can run after we emit notices
#[derive(SystemSet, Debug, Hash, PartialEq, Eq, Clone)]
pub enum WidgetSet {
    /// pointer + command handling
    Input,
    /// replies land, notices are emitted (in `Update`)
    Drain,
}

/// requests from the view.
#[derive(Event, Clone, Debug, PartialEq, Eq)]
pub enum WidgetCommand {
    Open,
    Close,
    Toggle,
    SetInput(String),
    QuickAction(usize),
    Submit,
}

/// re-run the backend liveness probe.
#[derive(Event, Clone, Copy, Debug, Default)]
pub struct RefreshBackendStatus;

#[derive(Resource, Clone, Debug, Default, PartialEq, Eq)]
pub enum BackendStatus {
    #[default]
    Unknown,
    Online,
    Offline(String),
}

/// root node of the widget; its `bottom`/`right` follow the anchor.
#[derive(Component, Default)]
pub struct WidgetRoot;

/// the expandable panel; hidden while the widget is closed.
#[derive(Component, Default)]
pub struct WidgetPanel;

/// interactive controls inside a drag surface (close button, ...). a press on
/// one of these never starts a drag.
#[derive(Component, Default)]
#[require(Interaction)]
pub struct WidgetControl;

#[derive(Debug)]
enum InboxMsg {
    Reply(Result<Value, TransportError>),
    Health(Result<(), TransportError>),
}

/// cross-thread inbox; exchange tasks send, main thread drains.
/// unbounded so a sender never parks the runtime worker: at most one exchange
/// plus a few probes are ever queued.
#[derive(Resource, Clone)]
struct ReplyInbox {
    tx: Sender<InboxMsg>,
    rx: Receiver<InboxMsg>,
}

impl Default for ReplyInbox {
    fn default() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }
}

/// send to inbox; only fails once the app (and its receiver) is gone.
fn push_inbox(tx: &Sender<InboxMsg>, msg: InboxMsg) {
    if tx.send(msg).is_err() {
        debug!(target: "bevy_assistant_widget", "inbox closed; dropping result");
    }
}

/// bevy plugin: wires systems, events, resources.
///
/// insert `WidgetConfig`, `UserIdentity`, `PositionStore` or `Transport`
/// before adding the plugin to override them; missing ones are derived from
/// the config (itself seeded from the environment).
pub struct AssistantWidgetPlugin;

impl Plugin for AssistantWidgetPlugin {
    fn build(&self, app: &mut App) {
        info!(target: "bevy_assistant_widget", "AssistantWidgetPlugin: build()");

        let config = match app.world().get_resource::<WidgetConfig>() {
            Some(config) => config.clone(),
            None => {
                let config = WidgetConfig::from_env();
                app.insert_resource(config.clone());
                config
            }
        };
        info!(target: "bevy_assistant_widget", "assistant endpoint: {}", config.endpoint);

        if app.world().get_resource::<UserIdentity>().is_none() {
            app.insert_resource(UserIdentity::default());
        }
        if app.world().get_resource::<Transport>().is_none() {
            app.insert_resource(Transport::new(HttpTransport::new(
                config.endpoint.clone(),
                config.request_timeout,
            )));
        }
        let store = match app.world().get_resource::<PositionStore>() {
            Some(store) => store.clone(),
            None => {
                let store = PositionStore::platform_default(config.storage_key.clone());
                app.insert_resource(store.clone());
                store
            }
        };

        app.insert_resource(store.load())
            .insert_resource(DragController::new(config.drag_dead_zone))
            .insert_resource(AssistantWidget::new(&config))
            .init_resource::<BackendStatus>()
            .init_resource::<ReplyInbox>()
            .add_event::<WidgetCommand>()
            .add_event::<WidgetNotice>()
            .add_event::<RefreshBackendStatus>()
            .configure_sets(Update, (WidgetSet::Input, WidgetSet::Drain).chain())
            .add_systems(Startup, request_initial_probe)
            .add_systems(
                Update,
                (
                    (
                        keep_anchor_on_screen,
                        cancel_drag_on_despawn,
                        begin_drag,
                        follow_drag.run_if(drag_active),
                        end_drag,
                    )
                        .chain(),
                    apply_widget_commands,
                    spawn_health_probes,
                )
                    .chain()
                    .in_set(WidgetSet::Input),
            )
            .add_systems(
                Update,
                (drain_reply_inbox, publish_notices, sync_anchor_nodes, sync_panel_visibility)
                    .chain()
                    .in_set(WidgetSet::Drain),
            );

        #[cfg(not(target_arch = "wasm32"))]
        if app.world().get_resource::<TokioRt>().is_none() {
            app.insert_resource(TokioRt::default());
        }
    }
}

fn drag_active(drag: Res<DragController>) -> bool {
    drag.is_dragging()
}

fn primary_cursor(window: &Window) -> Option<(Vec2, Vec2)> {
    let cursor = window.cursor_position()?;
    Some((cursor, Vec2::new(window.width(), window.height())))
}

/// re-clamps the live anchor when the primary window appears or changes size,
/// so a position saved on a larger screen stays reachable. the stored value
/// is left alone until the user drags again.
fn keep_anchor_on_screen(
    windows: Query<&Window, With<PrimaryWindow>>,
    mut last_size: Local<Option<Vec2>>,
    mut anchor: ResMut<AnchorPosition>,
    mut notices: EventWriter<WidgetNotice>,
) {
    let Ok(window) = windows.single() else {
        return;
    };
    let size = Vec2::new(window.width(), window.height());
    // minimized windows report zero
    if size.x <= 0.0 || size.y <= 0.0 || *last_size == Some(size) {
        return;
    }
    *last_size = Some(size);

    let clamped = drag::clamp_anchor(*anchor, size);
    if clamped != *anchor {
        info!(target: "bevy_assistant_widget", "anchor {:?} off-screen for {:?}; clamped to {:?}", *anchor, size, clamped);
        *anchor = clamped;
        notices.write(WidgetNotice::AnchorMoved(clamped));
    }
}

/// a surface that disappears mid-gesture ends it.
fn cancel_drag_on_despawn(mut removed: RemovedComponents<DragSurface>, mut drag: ResMut<DragController>) {
    if removed.read().count() > 0 && drag.is_dragging() {
        debug!(target: "bevy_assistant_widget", "drag surface removed mid-drag; cancelling");
        drag.cancel();
    }
}

fn begin_drag(
    mouse: Res<ButtonInput<MouseButton>>,
    windows: Query<&Window, With<PrimaryWindow>>,
    surfaces: Query<(&DragSurface, &Interaction)>,
    controls: Query<&Interaction, With<WidgetControl>>,
    anchor: Res<AnchorPosition>,
    mut drag: ResMut<DragController>,
) {
    if !mouse.just_pressed(MouseButton::Left) {
        return;
    }
    let Some(surface) = surfaces
        .iter()
        .find(|(_, i)| **i == Interaction::Pressed)
        .map(|(s, _)| *s)
    else {
        return;
    };
    let Some((cursor, _)) = windows.single().ok().and_then(primary_cursor) else {
        return;
    };
    let on_control = controls.iter().any(|i| *i == Interaction::Pressed);
    if drag.pointer_down(surface, on_control, cursor, *anchor) {
        debug!(target: "bevy_assistant_widget", "drag start: surface={:?} at {:?}", surface, cursor);
    }
}

fn follow_drag(
    windows: Query<&Window, With<PrimaryWindow>>,
    store: Res<PositionStore>,
    mut drag: ResMut<DragController>,
    mut anchor: ResMut<AnchorPosition>,
    mut notices: EventWriter<WidgetNotice>,
) {
    let Some((cursor, viewport)) = windows.single().ok().and_then(primary_cursor) else {
        return;
    };
    let Some(next) = drag.pointer_move(cursor, viewport) else {
        return;
    };
    if next != *anchor {
        *anchor = next;
        store.save(next);
        notices.write(WidgetNotice::AnchorMoved(next));
    }
}

fn end_drag(
    mouse: Res<ButtonInput<MouseButton>>,
    anchor: Res<AnchorPosition>,
    mut drag: ResMut<DragController>,
    mut widget: ResMut<AssistantWidget>,
) {
    if !mouse.just_released(MouseButton::Left) {
        return;
    }
    match drag.pointer_up() {
        DragRelease::Click(DragSurface::Launcher) => widget.toggle(),
        DragRelease::Dragged(surface) => {
            info!(target: "bevy_assistant_widget", "drag end: surface={:?} anchor={:?}", surface, *anchor);
        }
        DragRelease::Click(DragSurface::Header) | DragRelease::Ignored => {}
    }
}

fn apply_widget_commands(
    mut ev: EventReader<WidgetCommand>,
    mut widget: ResMut<AssistantWidget>,
    identity: Res<UserIdentity>,
    config: Res<WidgetConfig>,
    transport: Res<Transport>,
    inbox: Res<ReplyInbox>,

    // native-only: small runtime to drive the exchange
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    for cmd in ev.read() {
        match cmd {
            WidgetCommand::Open => widget.open(),
            WidgetCommand::Close => widget.close(),
            WidgetCommand::Toggle => widget.toggle(),
            WidgetCommand::SetInput(text) => widget.set_input(text.clone()),
            WidgetCommand::QuickAction(index) => {
                if !widget.apply_quick_action(*index) {
                    warn!(target: "bevy_assistant_widget", "unknown quick action {}", index);
                }
            }
            WidgetCommand::Submit => {
                let Some(payload) = widget.submit(&identity) else {
                    debug!(target: "bevy_assistant_widget", "submit ignored (blank input or busy)");
                    continue;
                };
                info!(target: "bevy_assistant_widget",
                    "sending message: len={} user={} role={} endpoint={}",
                    payload.message.len(), payload.user_id, payload.role, config.endpoint
                );
                let run = exchange(
                    transport.0.clone(),
                    payload,
                    config.request_timeout,
                    inbox.tx.clone(),
                );
                #[cfg(not(target_arch = "wasm32"))]
                spawn_detached(run, &rt);
                #[cfg(target_arch = "wasm32")]
                spawn_detached(run);
            }
        }
    }
}

async fn exchange(
    transport: Arc<dyn AssistantTransport>,
    payload: ChatPayload,
    timeout: Duration,
    inbox_tx: Sender<InboxMsg>,
) {
    let outcome = crate::transport::run_exchange(transport, payload, timeout).await;
    match &outcome {
        Ok(_) => debug!(target: "bevy_assistant_widget", "exchange completed"),
        Err(err) => error!(target: "bevy_assistant_widget", "exchange failed: {}", err),
    }
    push_inbox(&inbox_tx, InboxMsg::Reply(outcome));
}

#[cfg(not(target_arch = "wasm32"))]
fn spawn_detached(
    run: impl std::future::Future<Output = ()> + Send + 'static,
    rt: &TokioRt,
) {
    let rt = rt.0.clone();
    // native: hand off to tokio so bevy pools stay free.
    AsyncComputeTaskPool::get()
        .spawn(async move {
            let _ = rt.spawn(run).await;
        })
        .detach();
}

#[cfg(target_arch = "wasm32")]
fn spawn_detached(run: impl std::future::Future<Output = ()> + 'static) {
    // wasm path: just await directly (no tokio).
    AsyncComputeTaskPool::get().spawn(run).detach();
}

fn request_initial_probe(mut ev: EventWriter<RefreshBackendStatus>) {
    ev.write(RefreshBackendStatus);
}

fn spawn_health_probes(
    mut ev: EventReader<RefreshBackendStatus>,
    transport: Res<Transport>,
    inbox: Res<ReplyInbox>,
    #[cfg(not(target_arch = "wasm32"))] rt: Res<TokioRt>,
) {
    // collapse repeated requests within a frame
    if ev.read().count() == 0 {
        return;
    }
    let transport = transport.0.clone();
    let inbox_tx = inbox.tx.clone();
    let run = async move {
        let outcome = transport.health().await;
        push_inbox(&inbox_tx, InboxMsg::Health(outcome));
    };
    #[cfg(not(target_arch = "wasm32"))]
    spawn_detached(run, &rt);
    #[cfg(target_arch = "wasm32")]
    spawn_detached(run);
}

/// settles finished exchanges and probes.
fn drain_reply_inbox(
    inbox: Res<ReplyInbox>,
    mut widget: ResMut<AssistantWidget>,
    mut status: ResMut<BackendStatus>,
) {
    for msg in inbox.rx.try_iter() {
        match msg {
            InboxMsg::Reply(outcome) => {
                let ok = outcome.is_ok();
                widget.complete(outcome);
                if ok {
                    status.set_if_neq(BackendStatus::Online);
                }
                let len = widget.conversation().last().map_or(0, |m| m.text.len());
                info!(target: "bevy_assistant_widget", "reply appended: ok={} len={}", ok, len);
            }
            InboxMsg::Health(Ok(())) => {
                info!(target: "bevy_assistant_widget", "backend online");
                status.set_if_neq(BackendStatus::Online);
            }
            InboxMsg::Health(Err(err)) => {
                warn!(target: "bevy_assistant_widget", "backend offline: {}", err);
                status.set_if_neq(BackendStatus::Offline(err.to_string()));
            }
        }
    }
}

fn publish_notices(mut widget: ResMut<AssistantWidget>, mut notices: EventWriter<WidgetNotice>) {
    // avoid tripping change detection every frame
    if widget.bypass_change_detection().has_notices() {
        notices.write_batch(widget.drain_notices());
    }
}

fn sync_anchor_nodes(anchor: Res<AnchorPosition>, mut q: Query<(&mut Node, Ref<WidgetRoot>)>) {
    for (mut node, root) in &mut q {
        if !anchor.is_changed() && !root.is_added() {
            continue;
        }
        node.position_type = PositionType::Absolute;
        node.bottom = Val::Px(anchor.bottom);
        node.right = Val::Px(anchor.right);
    }
}

fn sync_panel_visibility(
    widget: Res<AssistantWidget>,
    mut q: Query<&mut Node, (With<WidgetPanel>, Without<WidgetRoot>)>,
) {
    let display = if widget.is_open() { Display::Flex } else { Display::None };
    for mut node in &mut q {
        if node.display != display {
            node.display = display;
        }
    }
}
