//! drag-to-reposition state machine.
//!
//! `Idle -> Dragging` on a pointer press over a drag surface (unless the press
//! landed on a control inside it), `Dragging -> Idle` on release anywhere.
//! pointer motion is mirrored onto the anchor because the anchor measures from
//! the bottom/right edges while pointer coordinates grow right/down.

use crate::position::AnchorPosition;
use bevy::prelude::*;

/// closest the widget may get to the bottom/right edges.
pub const MIN_MARGIN: f32 = 10.0;
/// space kept free towards the top/left edges so the widget stays grabbable.
pub const WIDGET_FOOTPRINT: f32 = 100.0;

/// ui nodes that start a drag when pressed.
#[derive(Component, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[require(Interaction)]
pub enum DragSurface {
    /// panel title bar
    Header,
    /// collapsed launcher button; a release without motion toggles the panel.
    Launcher,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DragSession {
    pub surface: DragSurface,
    pub origin: Vec2,
    pub start_anchor: AnchorPosition,
    /// set once the pointer leaves the dead zone; never cleared for this session.
    pub moved: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging(DragSession),
}

/// what a pointer release meant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DragRelease {
    /// no gesture was active
    Ignored,
    Click(DragSurface),
    Dragged(DragSurface),
}

#[derive(Resource, Clone, Debug)]
pub struct DragController {
    state: DragState,
    dead_zone: f32,
}

impl Default for DragController {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_DRAG_DEAD_ZONE)
    }
}

impl DragController {
    pub fn new(dead_zone: f32) -> Self {
        Self { state: DragState::Idle, dead_zone: dead_zone.max(0.0) }
    }

    pub fn state(&self) -> &DragState {
        &self.state
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.state, DragState::Dragging(_))
    }

    /// returns true when a drag session started.
    pub fn pointer_down(
        &mut self,
        surface: DragSurface,
        on_control: bool,
        pointer: Vec2,
        anchor: AnchorPosition,
    ) -> bool {
        if on_control || self.is_dragging() {
            return false;
        }
        self.state = DragState::Dragging(DragSession {
            surface,
            origin: pointer,
            start_anchor: anchor,
            moved: false,
        });
        true
    }

    /// candidate anchor for the current pointer, or `None` while idle or still
    /// inside the dead zone.
    pub fn pointer_move(&mut self, pointer: Vec2, viewport: Vec2) -> Option<AnchorPosition> {
        let DragState::Dragging(session) = &mut self.state else {
            return None;
        };
        if !session.moved {
            if pointer.distance(session.origin) <= self.dead_zone {
                return None;
            }
            session.moved = true;
        }
        let delta = session.origin - pointer;
        let candidate = AnchorPosition::new(
            session.start_anchor.bottom + delta.y,
            session.start_anchor.right + delta.x,
        );
        Some(clamp_anchor(candidate, viewport))
    }

    pub fn pointer_up(&mut self) -> DragRelease {
        match std::mem::take(&mut self.state) {
            DragState::Idle => DragRelease::Ignored,
            DragState::Dragging(DragSession { surface, moved: true, .. }) => DragRelease::Dragged(surface),
            DragState::Dragging(DragSession { surface, .. }) => DragRelease::Click(surface),
        }
    }

    /// drops the session without reporting a click (surface went away).
    pub fn cancel(&mut self) {
        self.state = DragState::Idle;
    }
}

/// keeps each axis within `[MIN_MARGIN, extent - WIDGET_FOOTPRINT]`; on a
/// viewport too small for that range the margin wins.
pub fn clamp_anchor(candidate: AnchorPosition, viewport: Vec2) -> AnchorPosition {
    AnchorPosition::new(
        clamp_axis(candidate.bottom, viewport.y),
        clamp_axis(candidate.right, viewport.x),
    )
}

fn clamp_axis(value: f32, extent: f32) -> f32 {
    value.min(extent - WIDGET_FOOTPRINT).max(MIN_MARGIN)
}
