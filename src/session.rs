//! Pointer-driven brush editing as an explicit state machine.
//!
//! [`EditSession::step`] is a pure function of the session, one event and a
//! read-only view of the active raster. It returns the next session plus at
//! most one [`RasterEdit`] for the caller to apply. [`EditSession::handle`]
//! does both against a [`StructureSet`], touching only the active ROI at the
//! current slice.
//!
//! Two things decide whether a press fills or erases:
//!
//! - the [`PressPolicy`]: `Push` fills when the slice is empty or the cursor
//!   is inside the ROI, `Primed` uses the mode primed by hover crossings;
//! - the invert key, which flips the decision for as long as it is held.

use serde::{Deserialize, Serialize};

use crate::contour::PixelPoint;
use crate::error::{Result, RoiError};
use crate::raster::{FILL_VALUE, RoiRaster};
use crate::structure::{RoiKey, StructureSet};

/// Whether brush strokes add to or remove from the ROI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FillMode {
    #[default]
    Fill,
    Erase,
}

impl FillMode {
    pub fn inverted(self) -> Self {
        match self {
            Self::Fill => Self::Erase,
            Self::Erase => Self::Fill,
        }
    }
}

/// Rule used to choose fill or erase when the button goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PressPolicy {
    /// Fill if the slice is empty or the cursor is inside, else erase.
    #[default]
    Push,
    /// Use the mode primed by the last boundary crossing.
    Primed,
}

/// Brush and interaction settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub brush_radius: u32,
    /// Radius change per wheel notch.
    pub wheel_step: u32,
    pub min_radius: u32,
    /// Upper bound on the brush radius; a loaded raster caps it further at
    /// its larger in-plane dimension.
    pub max_radius: u32,
    pub press_policy: PressPolicy,
    /// Value written when painting.
    pub fill_value: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            brush_radius: 10,
            wheel_step: 2,
            min_radius: 1,
            max_radius: 256,
            press_policy: PressPolicy::Push,
            fill_value: FILL_VALUE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EditState {
    #[default]
    Idle,
    Hovering {
        inside: bool,
    },
    Painting {
        mode: FillMode,
    },
}

/// Input events, in canvas pixel coordinates `(x, y) = (column, row)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Enter { x: i32, y: i32 },
    Move { x: i32, y: i32 },
    /// Primary button down.
    Press { x: i32, y: i32 },
    Release,
    Leave,
    /// Positive notches grow the brush or advance the slice.
    Wheel { notches: i32, modifier: bool },
    InvertKey { held: bool },
}

/// Discrete key commands acting on the active ROI and current slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    NextSlice,
    PreviousSlice,
    /// Select the ROI at this zero-based position.
    SelectOrdinal(usize),
    CycleRoi,
    /// Merge the neighbour at `current + direction` into the current slice.
    UnionNeighbor(i32),
    Dilate,
    Erode,
}

/// A raster mutation produced by a step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RasterEdit {
    Circle {
        slice: usize,
        center: PixelPoint,
        radius: u32,
        fill: u8,
    },
    /// The whole stroke so far, redrawn on each move.
    Stroke {
        slice: usize,
        points: Vec<PixelPoint>,
        thickness: u32,
        fill: u8,
    },
}

impl RasterEdit {
    pub fn apply(&self, raster: &mut RoiRaster) -> Result<()> {
        match self {
            Self::Circle {
                slice,
                center,
                radius,
                fill,
            } => raster.paint_circle(*slice, center.0, center.1, *radius, *fill),
            Self::Stroke {
                slice,
                points,
                thickness,
                fill,
            } => raster.stroke_polyline(*slice, points, *thickness, *fill),
        }
    }
}

/// Events worth surfacing to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    EnteredContour,
    LeftContour,
    BoundaryReached { slice: usize, direction: i32 },
}

/// Result of one [`EditSession::step`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub session: EditSession,
    pub edit: Option<RasterEdit>,
    pub notice: Option<Notice>,
}

/// Per-canvas editing state: brush, slice, hover priming and stroke buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditSession {
    config: SessionConfig,
    state: EditState,
    slice: usize,
    radius: u32,
    primed: FillMode,
    invert_held: bool,
    stroke: Vec<PixelPoint>,
}

impl Default for EditSession {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl EditSession {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            state: EditState::Idle,
            slice: 0,
            radius: config
                .brush_radius
                .clamp(config.min_radius, config.max_radius.max(config.min_radius)),
            primed: FillMode::Fill,
            invert_held: false,
            stroke: Vec::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> EditState {
        self.state
    }

    pub fn slice(&self) -> usize {
        self.slice
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Mode primed by hover crossings, before the invert key.
    pub fn primed(&self) -> FillMode {
        self.primed
    }

    pub fn invert_held(&self) -> bool {
        self.invert_held
    }

    pub fn stroke(&self) -> &[PixelPoint] {
        &self.stroke
    }

    /// Jump to `slice`, ending any stroke in progress.
    pub fn set_slice(&mut self, slice: usize, slices: usize) -> Result<()> {
        if slice >= slices {
            return Err(RoiError::IndexOutOfRange {
                what: "slice",
                index: slice as i64,
                len: slices,
            });
        }
        self.slice = slice;
        self.end_stroke();
        Ok(())
    }

    /// Compute the transition for `event` without mutating anything.
    ///
    /// `raster` is the active ROI's raster, `None` when nothing is selected;
    /// `slices` bounds slice navigation.
    pub fn step(
        &self,
        event: &PointerEvent,
        raster: Option<&RoiRaster>,
        slices: usize,
    ) -> Result<Step> {
        let mut next = self.clone();
        let mut edit = None;
        let mut notice = None;

        match *event {
            PointerEvent::Enter { x, y } => {
                next.state = EditState::Hovering {
                    inside: self.inside(raster, x, y)?,
                };
            }
            PointerEvent::Move { x, y } => match self.state {
                EditState::Painting { mode } => {
                    next.stroke.push((x, y));
                    edit = Some(RasterEdit::Stroke {
                        slice: self.slice,
                        points: next.stroke.clone(),
                        thickness: self.radius.saturating_mul(2),
                        fill: self.fill_value(mode),
                    });
                }
                EditState::Hovering { inside: was } => {
                    let now = self.inside(raster, x, y)?;
                    if !was && now {
                        notice = Some(Notice::EnteredContour);
                        if self.primed == FillMode::Fill {
                            next.primed = FillMode::Erase;
                        }
                    } else if was && !now {
                        notice = Some(Notice::LeftContour);
                        next.primed = FillMode::Fill;
                    }
                    next.state = EditState::Hovering { inside: now };
                }
                EditState::Idle => {
                    next.state = EditState::Hovering {
                        inside: self.inside(raster, x, y)?,
                    };
                }
            },
            PointerEvent::Press { x, y } => {
                let hovering = matches!(self.state, EditState::Hovering { .. });
                if let Some(raster) = raster
                    && hovering
                {
                    let mode = self.press_mode(raster, x, y)?;
                    next.radius = self.radius.min(self.radius_limit(Some(raster)));
                    next.state = EditState::Painting { mode };
                    next.stroke = vec![(x, y)];
                    edit = Some(RasterEdit::Circle {
                        slice: self.slice,
                        center: (x, y),
                        radius: next.radius,
                        fill: self.fill_value(mode),
                    });
                }
            }
            PointerEvent::Release => {
                if matches!(self.state, EditState::Painting { .. }) {
                    let inside = match (raster, self.stroke.last()) {
                        (Some(raster), Some(&(x, y))) => raster.is_inside(self.slice, x, y)?,
                        _ => false,
                    };
                    next.state = EditState::Hovering { inside };
                    next.stroke.clear();
                    if let Some(raster) = raster
                        && raster.slice_is_empty(self.slice)?
                    {
                        next.primed = FillMode::Fill;
                    }
                }
            }
            PointerEvent::Leave => {
                next.state = EditState::Idle;
                next.stroke.clear();
            }
            PointerEvent::Wheel { notches, modifier } => {
                if modifier {
                    if slices > 0 {
                        let target = (self.slice as i64 + i64::from(notches))
                            .clamp(0, slices as i64 - 1);
                        if target as usize != self.slice {
                            next.slice = target as usize;
                            next.end_stroke();
                        }
                    }
                } else if matches!(self.state, EditState::Hovering { .. }) {
                    let delta = i64::from(notches) * i64::from(self.config.wheel_step);
                    let radius = (i64::from(self.radius) + delta).clamp(
                        i64::from(self.config.min_radius),
                        i64::from(self.radius_limit(raster)),
                    );
                    next.radius = radius as u32;
                }
            }
            PointerEvent::InvertKey { held } => next.invert_held = held,
        }

        Ok(Step {
            session: next,
            edit,
            notice,
        })
    }

    /// Step and apply the resulting edit to the active ROI.
    ///
    /// If the edit fails the session is left unchanged.
    pub fn handle(
        &mut self,
        event: &PointerEvent,
        set: &mut StructureSet,
    ) -> Result<Option<Notice>> {
        let slices = set.geometry().slices;
        let step = self.step(event, set.active().map(|roi| roi.raster()), slices)?;
        if let (Some(edit), Some(roi)) = (&step.edit, set.active_mut()) {
            edit.apply(roi.raster_mut())?;
        }
        *self = step.session;
        Ok(step.notice)
    }

    /// Run a key command. Edit commands without an active ROI do nothing.
    pub fn key(&mut self, action: KeyAction, set: &mut StructureSet) -> Result<Option<Notice>> {
        let slices = set.geometry().slices;
        match action {
            KeyAction::NextSlice => {
                if self.slice + 1 < slices {
                    self.set_slice(self.slice + 1, slices)?;
                }
            }
            KeyAction::PreviousSlice => {
                if self.slice > 0 {
                    self.set_slice(self.slice - 1, slices)?;
                }
            }
            KeyAction::SelectOrdinal(n) => {
                set.select(&RoiKey::Ordinal(n))?;
            }
            KeyAction::CycleRoi => {
                set.cycle_active();
            }
            KeyAction::UnionNeighbor(direction) => {
                let Some(roi) = set.active_mut() else {
                    return Ok(None);
                };
                match roi.raster_mut().union_with_neighbor(self.slice, direction) {
                    Ok(()) => {}
                    Err(RoiError::BoundaryReached { slice, direction }) => {
                        tracing::warn!("No slice to merge from {slice} in direction {direction}");
                        return Ok(Some(Notice::BoundaryReached { slice, direction }));
                    }
                    Err(err) => return Err(err),
                }
            }
            KeyAction::Dilate | KeyAction::Erode => {
                let Some(roi) = set.active_mut() else {
                    return Ok(None);
                };
                let raster = roi.raster_mut();
                let size = raster.structuring_element_size();
                if action == KeyAction::Dilate {
                    raster.dilate(self.slice, size)?;
                } else {
                    raster.erode(self.slice, size)?;
                }
            }
        }
        Ok(None)
    }

    fn end_stroke(&mut self) {
        self.stroke.clear();
        if let EditState::Painting { .. } = self.state {
            self.state = EditState::Hovering { inside: false };
        }
    }

    /// Largest radius allowed against `raster`, never below the floor.
    fn radius_limit(&self, raster: Option<&RoiRaster>) -> u32 {
        let mut limit = self.config.max_radius;
        if let Some(raster) = raster {
            let (rows, cols, _) = raster.dim();
            limit = limit.min(u32::try_from(rows.max(cols)).unwrap_or(u32::MAX));
        }
        limit.max(self.config.min_radius)
    }

    fn inside(&self, raster: Option<&RoiRaster>, x: i32, y: i32) -> Result<bool> {
        match raster {
            Some(raster) => raster.is_inside(self.slice, x, y),
            None => Ok(false),
        }
    }

    fn press_mode(&self, raster: &RoiRaster, x: i32, y: i32) -> Result<FillMode> {
        let mode = match self.config.press_policy {
            PressPolicy::Push => {
                if raster.slice_is_empty(self.slice)? || raster.is_inside(self.slice, x, y)? {
                    FillMode::Fill
                } else {
                    FillMode::Erase
                }
            }
            PressPolicy::Primed => self.primed,
        };
        Ok(if self.invert_held { mode.inverted() } else { mode })
    }

    fn fill_value(&self, mode: FillMode) -> u8 {
        match mode {
            FillMode::Fill => self.config.fill_value.max(1),
            FillMode::Erase => 0,
        }
    }
}

// =============================================================================
// Unit Tests for session module
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{RotationConvention, VolumeGeometry};

    fn disc_raster() -> RoiRaster {
        let mut raster = RoiRaster::new(100, 100, 3);
        raster.paint_circle(1, 50, 50, 10, FILL_VALUE).unwrap();
        raster
    }

    fn session_on(slice: usize, config: SessionConfig) -> EditSession {
        let mut session = EditSession::new(config);
        session.set_slice(slice, 3).unwrap();
        session
    }

    fn run(
        session: &EditSession,
        raster: &RoiRaster,
        events: &[PointerEvent],
    ) -> (EditSession, Vec<Step>) {
        let mut current = session.clone();
        let mut steps = Vec::new();
        for event in events {
            let step = current.step(event, Some(raster), 3).unwrap();
            current = step.session.clone();
            steps.push(step);
        }
        (current, steps)
    }

    fn edit_set() -> StructureSet {
        let geometry = VolumeGeometry::axial(100, 100, 3, (1.0, 1.0), 1.0, [0.0; 3]).unwrap();
        let mut set = StructureSet::new(geometry, RotationConvention::Normal).unwrap();
        set.add_roi("target", [255, 0, 0]);
        set
    }

    // =========================================================================
    // Hover Tests
    // =========================================================================

    mod hover_tests {
        use super::*;

        #[test]
        fn enter_samples_inside() {
            let raster = disc_raster();
            let session = session_on(1, SessionConfig::default());
            let step = session
                .step(&PointerEvent::Enter { x: 50, y: 50 }, Some(&raster), 3)
                .unwrap();
            assert_eq!(step.session.state(), EditState::Hovering { inside: true });
            assert_eq!(step.notice, None);
        }

        #[test]
        fn crossing_primes_once_per_boundary() {
            let raster = disc_raster();
            let session = session_on(1, SessionConfig::default());
            let (after_in, steps) = run(
                &session,
                &raster,
                &[
                    PointerEvent::Enter { x: 10, y: 50 },
                    PointerEvent::Move { x: 48, y: 50 },
                    PointerEvent::Move { x: 50, y: 50 },
                ],
            );
            assert_eq!(steps[1].notice, Some(Notice::EnteredContour));
            assert_eq!(steps[2].notice, None);
            assert_eq!(after_in.primed(), FillMode::Erase);

            let (after_out, steps) = run(&after_in, &raster, &[PointerEvent::Move { x: 90, y: 50 }]);
            assert_eq!(steps[0].notice, Some(Notice::LeftContour));
            assert_eq!(after_out.primed(), FillMode::Fill);
        }

        #[test]
        fn no_active_roi_is_never_inside() {
            let session = EditSession::default();
            let step = session.step(&PointerEvent::Enter { x: 1, y: 1 }, None, 3).unwrap();
            assert_eq!(step.session.state(), EditState::Hovering { inside: false });
            let step = step
                .session
                .step(&PointerEvent::Press { x: 1, y: 1 }, None, 3)
                .unwrap();
            assert_eq!(step.edit, None);
        }

        #[test]
        fn leave_returns_to_idle() {
            let raster = disc_raster();
            let (session, _) = run(
                &EditSession::default(),
                &raster,
                &[PointerEvent::Enter { x: 1, y: 1 }, PointerEvent::Leave],
            );
            assert_eq!(session.state(), EditState::Idle);
        }
    }

    // =========================================================================
    // Press Tests
    // =========================================================================

    mod press_tests {
        use super::*;

        #[test]
        fn press_on_empty_slice_fills() {
            let raster = disc_raster();
            let session = session_on(0, SessionConfig::default());
            let (_, steps) = run(
                &session,
                &raster,
                &[PointerEvent::Enter { x: 5, y: 5 }, PointerEvent::Press { x: 5, y: 5 }],
            );
            assert_eq!(
                steps[1].edit,
                Some(RasterEdit::Circle {
                    slice: 0,
                    center: (5, 5),
                    radius: 10,
                    fill: FILL_VALUE
                })
            );
            assert_eq!(
                steps[1].session.state(),
                EditState::Painting { mode: FillMode::Fill }
            );
        }

        #[test]
        fn push_policy_erases_outside_and_fills_inside() {
            let raster = disc_raster();
            let session = session_on(1, SessionConfig::default());

            let (outside, _) = run(
                &session,
                &raster,
                &[PointerEvent::Enter { x: 5, y: 5 }, PointerEvent::Press { x: 5, y: 5 }],
            );
            assert_eq!(outside.state(), EditState::Painting { mode: FillMode::Erase });

            let (inside, _) = run(
                &session,
                &raster,
                &[PointerEvent::Enter { x: 50, y: 50 }, PointerEvent::Press { x: 50, y: 50 }],
            );
            assert_eq!(inside.state(), EditState::Painting { mode: FillMode::Fill });
        }

        #[test]
        fn primed_policy_follows_crossings() {
            let raster = disc_raster();
            let config = SessionConfig {
                press_policy: PressPolicy::Primed,
                ..SessionConfig::default()
            };
            let (session, _) = run(
                &session_on(1, config),
                &raster,
                &[
                    PointerEvent::Enter { x: 5, y: 50 },
                    PointerEvent::Move { x: 50, y: 50 },
                    PointerEvent::Press { x: 50, y: 50 },
                ],
            );
            assert_eq!(session.state(), EditState::Painting { mode: FillMode::Erase });
        }

        #[test]
        fn invert_key_overrides_while_held() {
            let raster = disc_raster();
            let session = session_on(1, SessionConfig::default());
            let (held, _) = run(
                &session,
                &raster,
                &[
                    PointerEvent::InvertKey { held: true },
                    PointerEvent::Enter { x: 50, y: 50 },
                    PointerEvent::Press { x: 50, y: 50 },
                ],
            );
            assert_eq!(held.state(), EditState::Painting { mode: FillMode::Erase });

            let (released, _) = run(
                &held,
                &raster,
                &[
                    PointerEvent::Release,
                    PointerEvent::InvertKey { held: false },
                    PointerEvent::Press { x: 50, y: 50 },
                ],
            );
            assert_eq!(released.state(), EditState::Painting { mode: FillMode::Fill });
        }

        #[test]
        fn press_without_hover_is_ignored() {
            let raster = disc_raster();
            let session = session_on(1, SessionConfig::default());
            let step = session
                .step(&PointerEvent::Press { x: 50, y: 50 }, Some(&raster), 3)
                .unwrap();
            assert_eq!(step.edit, None);
            assert_eq!(step.session.state(), EditState::Idle);
        }

        #[test]
        fn press_while_painting_is_ignored() {
            let raster = disc_raster();
            let (session, _) = run(
                &session_on(1, SessionConfig::default()),
                &raster,
                &[PointerEvent::Enter { x: 50, y: 50 }, PointerEvent::Press { x: 50, y: 50 }],
            );
            let step = session
                .step(&PointerEvent::Press { x: 5, y: 5 }, Some(&raster), 3)
                .unwrap();
            assert_eq!(step.edit, None);
            assert_eq!(step.session, session);
        }
    }

    // =========================================================================
    // Stroke Tests
    // =========================================================================

    mod stroke_tests {
        use super::*;

        #[test]
        fn moves_redraw_whole_buffer() {
            let raster = disc_raster();
            let (_, steps) = run(
                &session_on(0, SessionConfig::default()),
                &raster,
                &[
                    PointerEvent::Enter { x: 10, y: 10 },
                    PointerEvent::Press { x: 10, y: 10 },
                    PointerEvent::Move { x: 20, y: 10 },
                    PointerEvent::Move { x: 30, y: 15 },
                ],
            );
            assert_eq!(
                steps[3].edit,
                Some(RasterEdit::Stroke {
                    slice: 0,
                    points: vec![(10, 10), (20, 10), (30, 15)],
                    thickness: 20,
                    fill: FILL_VALUE
                })
            );
        }

        #[test]
        fn release_flushes_buffer() {
            let raster = disc_raster();
            let (session, _) = run(
                &session_on(1, SessionConfig::default()),
                &raster,
                &[
                    PointerEvent::Enter { x: 50, y: 50 },
                    PointerEvent::Press { x: 50, y: 50 },
                    PointerEvent::Move { x: 52, y: 50 },
                    PointerEvent::Release,
                ],
            );
            assert!(session.stroke().is_empty());
            assert_eq!(session.state(), EditState::Hovering { inside: true });
        }

        #[test]
        fn release_on_emptied_slice_reprimes_fill() {
            let mut set = edit_set();
            let mut session = EditSession::default();
            set.active_mut()
                .unwrap()
                .raster_mut()
                .paint_circle(0, 50, 50, 3, FILL_VALUE)
                .unwrap();

            for event in [
                PointerEvent::Enter { x: 20, y: 50 },
                PointerEvent::Move { x: 50, y: 50 },
                PointerEvent::InvertKey { held: true },
                PointerEvent::Press { x: 50, y: 50 },
                PointerEvent::Release,
                PointerEvent::InvertKey { held: false },
            ] {
                session.handle(&event, &mut set).unwrap();
            }
            assert!(set.active().unwrap().raster().is_empty());
            assert_eq!(session.primed(), FillMode::Fill);
        }
    }

    // =========================================================================
    // Wheel Tests
    // =========================================================================

    mod wheel_tests {
        use super::*;

        fn hovering() -> EditSession {
            EditSession::default()
                .step(&PointerEvent::Enter { x: 1, y: 1 }, None, 3)
                .unwrap()
                .session
        }

        #[test]
        fn wheel_adjusts_radius_with_floor() {
            let step = hovering()
                .step(&PointerEvent::Wheel { notches: 2, modifier: false }, None, 3)
                .unwrap();
            assert_eq!(step.session.radius(), 14);
            let step = step
                .session
                .step(&PointerEvent::Wheel { notches: -20, modifier: false }, None, 3)
                .unwrap();
            assert_eq!(step.session.radius(), 1);
        }

        #[test]
        fn wheel_radius_is_capped_by_config_and_raster() {
            let step = hovering()
                .step(&PointerEvent::Wheel { notches: i32::MAX, modifier: false }, None, 3)
                .unwrap();
            assert_eq!(step.session.radius(), 256);

            let raster = disc_raster();
            let step = hovering()
                .step(
                    &PointerEvent::Wheel { notches: i32::MAX, modifier: false },
                    Some(&raster),
                    3,
                )
                .unwrap();
            assert_eq!(step.session.radius(), 100);
        }

        #[test]
        fn radius_wheel_is_ignored_outside_hover() {
            let idle = EditSession::default();
            let step = idle
                .step(&PointerEvent::Wheel { notches: 3, modifier: false }, None, 3)
                .unwrap();
            assert_eq!(step.session.radius(), 10);

            let raster = disc_raster();
            let (painting, _) = run(
                &session_on(1, SessionConfig::default()),
                &raster,
                &[PointerEvent::Enter { x: 50, y: 50 }, PointerEvent::Press { x: 50, y: 50 }],
            );
            let step = painting
                .step(&PointerEvent::Wheel { notches: 3, modifier: false }, Some(&raster), 3)
                .unwrap();
            assert_eq!(step.session.radius(), 10);
        }

        #[test]
        fn modifier_wheel_changes_slice_within_bounds() {
            let session = EditSession::default();
            let step = session
                .step(&PointerEvent::Wheel { notches: 5, modifier: true }, None, 3)
                .unwrap();
            assert_eq!(step.session.slice(), 2);
            assert_eq!(step.session.radius(), 10);
            let step = step
                .session
                .step(&PointerEvent::Wheel { notches: -1, modifier: true }, None, 3)
                .unwrap();
            assert_eq!(step.session.slice(), 1);
        }
    }

    // =========================================================================
    // Applied Edit Tests
    // =========================================================================

    mod handle_tests {
        use super::*;

        #[test]
        fn handle_only_touches_current_slice_of_active_roi() {
            let mut set = edit_set();
            let other = set.add_roi("other", [0, 0, 255]);
            let mut session = EditSession::default();
            session.set_slice(1, 3).unwrap();

            for event in [
                PointerEvent::Enter { x: 30, y: 30 },
                PointerEvent::Press { x: 30, y: 30 },
                PointerEvent::Move { x: 60, y: 30 },
                PointerEvent::Release,
            ] {
                session.handle(&event, &mut set).unwrap();
            }

            let active = set.active().unwrap().raster();
            assert_eq!(active.occupied_slices(), vec![1]);
            assert!(active.is_inside(1, 45, 30).unwrap());
            assert!(set.get(other).unwrap().raster().is_empty());
        }

        #[test]
        fn oversized_brush_far_off_canvas_is_harmless() {
            let mut set = edit_set();
            let mut session = EditSession::new(SessionConfig {
                max_radius: u32::MAX,
                ..SessionConfig::default()
            });

            for event in [
                PointerEvent::Enter { x: 50, y: 50 },
                PointerEvent::Wheel { notches: i32::MAX, modifier: false },
            ] {
                session.handle(&event, &mut set).unwrap();
            }
            assert_eq!(session.radius(), 100);

            for event in [
                PointerEvent::Press { x: i32::MAX, y: i32::MAX },
                PointerEvent::Move { x: i32::MIN, y: i32::MAX },
                PointerEvent::Release,
            ] {
                session.handle(&event, &mut set).unwrap();
            }
            assert!(set.active().unwrap().raster().is_empty());
        }

        #[test]
        fn stroke_crossing_the_canvas_from_far_away_paints_its_track() {
            let mut set = edit_set();
            let mut session = EditSession::new(SessionConfig {
                brush_radius: 2,
                ..SessionConfig::default()
            });

            for event in [
                PointerEvent::Enter { x: 50, y: 50 },
                PointerEvent::Press { x: -1_000_000, y: 50 },
                PointerEvent::Move { x: 1_000_000, y: 50 },
                PointerEvent::Release,
            ] {
                session.handle(&event, &mut set).unwrap();
            }
            let raster = set.active().unwrap().raster();
            assert!(raster.is_inside(0, 0, 50).unwrap());
            assert!(raster.is_inside(0, 99, 50).unwrap());
            assert!(!raster.is_inside(0, 50, 60).unwrap());
        }

        #[test]
        fn union_at_first_slice_is_a_notice() {
            let mut set = edit_set();
            let mut session = EditSession::default();
            let notice = session.key(KeyAction::UnionNeighbor(-1), &mut set).unwrap();
            assert_eq!(
                notice,
                Some(Notice::BoundaryReached {
                    slice: 0,
                    direction: -1
                })
            );
        }

        #[test]
        fn union_neighbor_merges_previous_slice() {
            let mut set = edit_set();
            set.active_mut()
                .unwrap()
                .raster_mut()
                .paint_circle(0, 20, 20, 4, FILL_VALUE)
                .unwrap();
            let mut session = EditSession::default();
            session.key(KeyAction::NextSlice, &mut set).unwrap();
            session.key(KeyAction::UnionNeighbor(-1), &mut set).unwrap();
            assert!(set.active().unwrap().raster().is_inside(1, 20, 20).unwrap());
        }

        #[test]
        fn slice_keys_stop_at_volume_edges() {
            let mut set = edit_set();
            let mut session = EditSession::default();
            session.key(KeyAction::PreviousSlice, &mut set).unwrap();
            assert_eq!(session.slice(), 0);
            for _ in 0..5 {
                session.key(KeyAction::NextSlice, &mut set).unwrap();
            }
            assert_eq!(session.slice(), 2);
        }

        #[test]
        fn selection_keys_change_active_roi() {
            let mut set = edit_set();
            let second = set.add_roi("second", [0; 3]);
            let mut session = EditSession::default();
            session.key(KeyAction::SelectOrdinal(1), &mut set).unwrap();
            assert_eq!(set.active_id(), Some(second));
            session.key(KeyAction::CycleRoi, &mut set).unwrap();
            assert_ne!(set.active_id(), Some(second));
            assert!(session.key(KeyAction::SelectOrdinal(9), &mut set).is_err());
        }

        #[test]
        fn dilate_key_grows_current_slice() {
            let mut set = edit_set();
            set.active_mut()
                .unwrap()
                .raster_mut()
                .paint_circle(0, 50, 50, 10, FILL_VALUE)
                .unwrap();
            let before = set.active().unwrap().raster().count();
            let mut session = EditSession::default();
            session.key(KeyAction::Dilate, &mut set).unwrap();
            assert!(set.active().unwrap().raster().count() > before);
            session.key(KeyAction::Erode, &mut set).unwrap();
            session.key(KeyAction::Erode, &mut set).unwrap();
            assert!(set.active().unwrap().raster().count() < before);
        }
    }
}
