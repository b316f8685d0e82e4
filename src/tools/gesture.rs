//! Shared gesture plumbing
//!
//! Sits between host input and the active tool. Middle-button drags pan,
//! the wheel zooms around the cursor, and touch input is disambiguated:
//! a touch is held for the hold delay before it is known whether it is a
//! one-finger stroke or a two-finger pinch. The host owns the clock, so a
//! pending touch resolves on the next touch event or on [`GestureState::tick`].

use std::time::{Duration, Instant};

use crate::compositor::Compositor;
use crate::core::geometry::Point;
use crate::tools::{PointerButton, ToolPointer};

/// Mouse/pen event in screen space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointerEvent {
    pub position: Point,
    pub button: PointerButton,
    /// Screen-space delta since the previous event
    pub movement: Point,
}

impl PointerEvent {
    pub fn new(x: f64, y: f64, button: PointerButton) -> Self {
        Self {
            position: Point::new(x, y),
            button,
            movement: Point::default(),
        }
    }

    pub fn with_movement(mut self, dx: f64, dy: f64) -> Self {
        self.movement = Point::new(dx, dy);
        self
    }
}

/// Active touches in screen space
#[derive(Debug, Clone, PartialEq)]
pub struct TouchEvent {
    pub touches: Vec<Point>,
    pub time: Instant,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    PointerDown(PointerEvent),
    PointerMove(PointerEvent),
    PointerUp(PointerEvent),
    PointerLeave,
    Wheel { position: Point, delta_y: f64 },
    TouchStart(TouchEvent),
    TouchMove(TouchEvent),
    TouchEnd(TouchEvent),
}

/// Event for the active tool, in image space
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Routed {
    Down(ToolPointer),
    Move(ToolPointer),
    Up(ToolPointer),
    Leave,
    Wheel(Point),
}

#[derive(Debug, Clone)]
struct PendingTouch {
    touches: Vec<Point>,
    since: Instant,
}

#[derive(Debug)]
pub struct GestureState {
    hold: Duration,
    panning: bool,
    pending: Option<PendingTouch>,
    pinch: Option<[Point; 2]>,
    /// Screen position of a touch that became a pointer stroke
    touch_pointer: Option<Point>,
}

impl GestureState {
    pub fn new(hold: Duration) -> Self {
        Self {
            hold,
            panning: false,
            pending: None,
            pinch: None,
            touch_pointer: None,
        }
    }

    pub fn is_panning(&self) -> bool {
        self.panning
    }

    pub fn is_pinching(&self) -> bool {
        self.pinch.is_some()
    }

    fn to_tool(compositor: &Compositor, screen: Point, button: PointerButton) -> ToolPointer {
        ToolPointer {
            position: compositor.screen_to_image(screen),
            button,
        }
    }

    pub fn handle(&mut self, compositor: &mut Compositor, event: InputEvent) -> Vec<Routed> {
        match event {
            InputEvent::PointerDown(e) => {
                if e.button == PointerButton::Middle {
                    self.panning = true;
                    return Vec::new();
                }
                vec![Routed::Down(Self::to_tool(compositor, e.position, e.button))]
            }
            InputEvent::PointerMove(e) => {
                if self.panning {
                    compositor.update_viewport(|v| v.pan(e.movement.x, e.movement.y));
                    return Vec::new();
                }
                vec![Routed::Move(Self::to_tool(compositor, e.position, e.button))]
            }
            InputEvent::PointerUp(e) => {
                if e.button == PointerButton::Middle && self.panning {
                    self.panning = false;
                    return Vec::new();
                }
                vec![Routed::Up(Self::to_tool(compositor, e.position, e.button))]
            }
            InputEvent::PointerLeave => {
                self.panning = false;
                vec![Routed::Leave]
            }
            InputEvent::Wheel { position, delta_y } => {
                compositor.update_viewport(|v| v.wheel(position, delta_y));
                vec![Routed::Wheel(compositor.screen_to_image(position))]
            }
            InputEvent::TouchStart(e) => self.touch_start(compositor, e),
            InputEvent::TouchMove(e) => self.touch_move(compositor, e),
            InputEvent::TouchEnd(e) => self.touch_end(compositor, e),
        }
    }

    /// Resolve a pending touch whose hold delay has passed
    pub fn tick(&mut self, compositor: &Compositor, now: Instant) -> Vec<Routed> {
        self.resolve(compositor, now).into_iter().collect()
    }

    fn resolve(&mut self, compositor: &Compositor, now: Instant) -> Option<Routed> {
        let pending = self.pending.as_ref()?;
        if now.saturating_duration_since(pending.since) < self.hold {
            return None;
        }
        let pending = self.pending.take()?;
        match pending.touches.as_slice() {
            [a, b, ..] => {
                tracing::debug!("Touch resolved as pinch");
                self.pinch = Some([*a, *b]);
                None
            }
            [a] => {
                self.touch_pointer = Some(*a);
                Some(Routed::Down(Self::to_tool(compositor, *a, PointerButton::Primary)))
            }
            [] => None,
        }
    }

    fn touch_start(&mut self, compositor: &Compositor, e: TouchEvent) -> Vec<Routed> {
        let routed: Vec<Routed> = self.resolve(compositor, e.time).into_iter().collect();
        if self.pinch.is_some() || self.touch_pointer.is_some() {
            return routed;
        }
        match self.pending.as_mut() {
            // second finger joins while still undecided
            Some(pending) => pending.touches = e.touches,
            None => {
                self.pending = Some(PendingTouch {
                    touches: e.touches,
                    since: e.time,
                })
            }
        }
        routed
    }

    fn touch_move(&mut self, compositor: &mut Compositor, e: TouchEvent) -> Vec<Routed> {
        let mut routed: Vec<Routed> = self.resolve(compositor, e.time).into_iter().collect();
        if let Some(previous) = self.pinch {
            if let [a, b, ..] = e.touches.as_slice() {
                let current = [*a, *b];
                compositor.update_viewport(|v| v.pinch(previous, current));
                self.pinch = Some(current);
            }
            return routed;
        }
        if let Some(pending) = self.pending.as_mut() {
            pending.touches = e.touches;
            return routed;
        }
        if let Some(first) = e.touches.first() {
            if self.touch_pointer.is_some() {
                self.touch_pointer = Some(*first);
                routed.push(Routed::Move(Self::to_tool(compositor, *first, PointerButton::Primary)));
            }
        }
        routed
    }

    fn touch_end(&mut self, compositor: &Compositor, e: TouchEvent) -> Vec<Routed> {
        let mut routed: Vec<Routed> = self.resolve(compositor, e.time).into_iter().collect();
        if let Some(pending) = self.pending.take() {
            // released before the hold delay: a tap
            if let Some(first) = pending.touches.first() {
                let pointer = Self::to_tool(compositor, *first, PointerButton::Primary);
                routed.push(Routed::Down(pointer));
                routed.push(Routed::Up(pointer));
            }
            return routed;
        }
        if self.pinch.is_some() {
            if e.touches.len() < 2 {
                self.pinch = None;
            }
            return routed;
        }
        if let Some(last) = self.touch_pointer.take() {
            routed.push(Routed::Up(Self::to_tool(compositor, last, PointerButton::Primary)));
        }
        routed
    }
}
