//! Slot bookkeeping for single-shot and front/back captures.
//!
//! The flow only reacts to discrete user actions. Each accepted action
//! returns a [`FlowEffect`] telling the session what to do with the camera.

use crate::encode::EncodedImage;
use crate::error::{CaptureError, Result};
use crate::types::{CaptureMode, Side};
use serde::Serialize;

/// Named states of the capture flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    AwaitingCapture,
    Captured,
    AwaitingFront,
    FrontCaptured,
    AwaitingBack,
    BothCaptured,
    Confirmed,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::AwaitingCapture => "awaiting capture",
            FlowState::Captured => "reviewing the capture",
            FlowState::AwaitingFront => "awaiting the front side",
            FlowState::FrontCaptured => "reviewing the front side",
            FlowState::AwaitingBack => "awaiting the back side",
            FlowState::BothCaptured => "reviewing the back side",
            FlowState::Confirmed => "confirmed",
        }
    }
}

/// One capture target. Never edited in place: retake swaps in an empty slot.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedSlot {
    pub side: Side,
    image: Option<EncodedImage>,
}

impl CapturedSlot {
    fn empty(side: Side) -> Self {
        Self { side, image: None }
    }

    fn filled(side: Side, image: EncodedImage) -> Self {
        Self {
            side,
            image: Some(image),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.image.is_some()
    }

    pub fn image(&self) -> Option<&EncodedImage> {
        self.image.as_ref()
    }
}

/// What a confirmed session hands back to its host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CaptureResult {
    Single(EncodedImage),
    FrontBack {
        front: EncodedImage,
        back: EncodedImage,
    },
}

/// Camera work requested by an accepted action.
#[derive(Debug, Clone, PartialEq)]
pub enum FlowEffect {
    /// A still is under review; the live stream can be released.
    ReleaseStream,
    /// Back to the live view.
    RestartStream,
    /// Review display changed; no camera work.
    Stay,
    /// The flow is complete.
    Emit(CaptureResult),
}

#[derive(Debug, Clone)]
pub struct CaptureFlow {
    mode: CaptureMode,
    active: Side,
    reviewing: bool,
    confirmed: bool,
    slots: Vec<CapturedSlot>,
}

impl CaptureFlow {
    pub fn new(mode: CaptureMode) -> Self {
        let (active, slots) = match mode {
            CaptureMode::Single => (Side::Sole, vec![CapturedSlot::empty(Side::Sole)]),
            CaptureMode::FrontBack => (
                Side::Front,
                vec![
                    CapturedSlot::empty(Side::Front),
                    CapturedSlot::empty(Side::Back),
                ],
            ),
        };

        Self {
            mode,
            active,
            reviewing: false,
            confirmed: false,
            slots,
        }
    }

    pub fn mode(&self) -> CaptureMode {
        self.mode
    }

    /// The side the next shutter fills. Always `Sole` in single mode.
    pub fn active_side(&self) -> Side {
        self.active
    }

    pub fn is_reviewing(&self) -> bool {
        self.reviewing
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    pub fn slots(&self) -> &[CapturedSlot] {
        &self.slots
    }

    pub fn slot(&self, side: Side) -> Option<&CapturedSlot> {
        self.slots.iter().find(|slot| slot.side == side)
    }

    fn is_filled(&self, side: Side) -> bool {
        self.slot(side).is_some_and(CapturedSlot::is_filled)
    }

    fn replace(&mut self, slot: CapturedSlot) {
        if let Some(existing) = self.slots.iter_mut().find(|s| s.side == slot.side) {
            *existing = slot;
        }
    }

    pub fn state(&self) -> FlowState {
        if self.confirmed {
            return FlowState::Confirmed;
        }
        match (self.active, self.reviewing) {
            (Side::Sole, false) => FlowState::AwaitingCapture,
            (Side::Sole, true) => FlowState::Captured,
            (Side::Front, false) => FlowState::AwaitingFront,
            (Side::Front, true) => FlowState::FrontCaptured,
            (Side::Back, false) => FlowState::AwaitingBack,
            (Side::Back, true) => FlowState::BothCaptured,
        }
    }

    fn reject(&self, action: &'static str) -> CaptureError {
        CaptureError::InvalidTransition {
            action,
            state: self.state().as_str(),
        }
    }

    pub fn can_capture(&self) -> bool {
        !self.confirmed && !self.reviewing
    }

    pub fn can_retake(&self) -> bool {
        !self.confirmed && self.reviewing && self.is_filled(self.active)
    }

    pub fn can_advance(&self) -> bool {
        !self.confirmed && self.active == Side::Front && self.is_filled(Side::Front)
    }

    pub fn can_go_back(&self) -> bool {
        !self.confirmed && self.active == Side::Back
    }

    /// Confirm is offered only once every slot holds an image.
    pub fn can_confirm(&self) -> bool {
        !self.confirmed && self.reviewing && self.slots.iter().all(CapturedSlot::is_filled)
    }

    /// File a still into the active slot and switch to its review.
    pub fn record(&mut self, image: EncodedImage) -> Result<FlowEffect> {
        if !self.can_capture() {
            return Err(self.reject("capture"));
        }
        self.replace(CapturedSlot::filled(self.active, image));
        self.reviewing = true;
        Ok(FlowEffect::ReleaseStream)
    }

    /// Empty the active slot and return to its live view.
    pub fn retake(&mut self) -> Result<FlowEffect> {
        if !self.can_retake() {
            return Err(self.reject("retake"));
        }
        self.replace(CapturedSlot::empty(self.active));
        self.reviewing = false;
        Ok(FlowEffect::RestartStream)
    }

    /// Move from the front side to the back side.
    pub fn next_side(&mut self) -> Result<FlowEffect> {
        if !self.can_advance() {
            return Err(self.reject("next side"));
        }
        self.active = Side::Back;
        if self.is_filled(Side::Back) {
            // Back was captured earlier; show it rather than overwrite it.
            self.reviewing = true;
            Ok(FlowEffect::Stay)
        } else {
            self.reviewing = false;
            Ok(FlowEffect::RestartStream)
        }
    }

    /// Return from the back side to the front side review.
    pub fn previous_side(&mut self) -> Result<FlowEffect> {
        if !self.can_go_back() {
            return Err(self.reject("previous side"));
        }
        let was_live = !self.reviewing;
        self.active = Side::Front;
        self.reviewing = true;
        Ok(if was_live {
            FlowEffect::ReleaseStream
        } else {
            FlowEffect::Stay
        })
    }

    pub fn confirm(&mut self) -> Result<FlowEffect> {
        if !self.can_confirm() {
            return Err(self.reject("confirm"));
        }

        let mut images = self.slots.iter().filter_map(|slot| slot.image().cloned());
        let result = match self.mode {
            CaptureMode::Single => images.next().map(CaptureResult::Single),
            CaptureMode::FrontBack => match (images.next(), images.next()) {
                (Some(front), Some(back)) => Some(CaptureResult::FrontBack { front, back }),
                _ => None,
            },
        };
        let result = result.ok_or_else(|| self.reject("confirm"))?;

        self.confirmed = true;
        Ok(FlowEffect::Emit(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn still(tag: u8) -> EncodedImage {
        EncodedImage {
            width: 1,
            height: 1,
            data: vec![tag],
        }
    }

    fn filled(flow: &CaptureFlow, side: Side) -> bool {
        flow.slot(side).unwrap().is_filled()
    }

    #[test]
    fn single_mode_degenerates() {
        let mut flow = CaptureFlow::new(CaptureMode::Single);
        assert_eq!(flow.mode(), CaptureMode::Single);
        assert_eq!(flow.state(), FlowState::AwaitingCapture);
        assert!(!flow.can_confirm());

        assert_eq!(flow.record(still(1)).unwrap(), FlowEffect::ReleaseStream);
        assert_eq!(flow.state(), FlowState::Captured);
        assert!(flow.can_confirm());

        assert_eq!(flow.retake().unwrap(), FlowEffect::RestartStream);
        assert_eq!(flow.state(), FlowState::AwaitingCapture);
        assert!(!filled(&flow, Side::Sole));

        flow.record(still(2)).unwrap();
        assert_eq!(
            flow.confirm().unwrap(),
            FlowEffect::Emit(CaptureResult::Single(still(2)))
        );
        assert_eq!(flow.state(), FlowState::Confirmed);
        assert!(flow.is_confirmed());
        assert!(!flow.can_capture());
    }

    #[test]
    fn single_mode_has_no_sides() {
        let mut flow = CaptureFlow::new(CaptureMode::Single);
        flow.record(still(1)).unwrap();
        assert!(flow.next_side().is_err());
        assert!(flow.previous_side().is_err());
        assert_eq!(flow.active_side(), Side::Sole);
        assert_eq!(flow.slots().len(), 1);
    }

    #[test]
    fn front_then_back_then_confirm() {
        let mut flow = CaptureFlow::new(CaptureMode::FrontBack);
        assert_eq!(flow.mode(), CaptureMode::FrontBack);
        assert!(!flow.is_confirmed());
        assert_eq!(flow.state(), FlowState::AwaitingFront);
        assert!(flow.next_side().is_err());

        flow.record(still(1)).unwrap();
        assert_eq!(flow.state(), FlowState::FrontCaptured);
        assert!(!flow.can_confirm());
        assert!(flow.confirm().is_err());

        assert_eq!(flow.next_side().unwrap(), FlowEffect::RestartStream);
        assert_eq!(flow.state(), FlowState::AwaitingBack);

        flow.record(still(2)).unwrap();
        assert_eq!(flow.state(), FlowState::BothCaptured);
        assert!(flow.can_confirm());

        assert_eq!(
            flow.confirm().unwrap(),
            FlowEffect::Emit(CaptureResult::FrontBack {
                front: still(1),
                back: still(2)
            })
        );
        assert!(flow.record(still(3)).is_err());
    }

    #[test]
    fn previous_from_awaiting_back_keeps_slots() {
        let mut flow = CaptureFlow::new(CaptureMode::FrontBack);
        flow.record(still(1)).unwrap();
        flow.next_side().unwrap();

        assert_eq!(flow.previous_side().unwrap(), FlowEffect::ReleaseStream);
        assert_eq!(flow.state(), FlowState::FrontCaptured);
        assert!(filled(&flow, Side::Front));
        assert!(!filled(&flow, Side::Back));
        assert!(flow.previous_side().is_err());
    }

    #[test]
    fn previous_from_back_review_then_next_returns_to_review() {
        let mut flow = CaptureFlow::new(CaptureMode::FrontBack);
        flow.record(still(1)).unwrap();
        flow.next_side().unwrap();
        flow.record(still(2)).unwrap();

        assert_eq!(flow.previous_side().unwrap(), FlowEffect::Stay);
        assert_eq!(flow.state(), FlowState::FrontCaptured);
        assert!(filled(&flow, Side::Back));

        assert_eq!(flow.next_side().unwrap(), FlowEffect::Stay);
        assert_eq!(flow.state(), FlowState::BothCaptured);
    }

    #[test]
    fn retake_clears_only_the_active_side() {
        let mut flow = CaptureFlow::new(CaptureMode::FrontBack);
        flow.record(still(1)).unwrap();
        flow.next_side().unwrap();
        flow.record(still(2)).unwrap();

        flow.retake().unwrap();
        assert_eq!(flow.state(), FlowState::AwaitingBack);
        assert!(filled(&flow, Side::Front));
        assert!(!filled(&flow, Side::Back));
        assert!(!flow.can_confirm());

        flow.previous_side().unwrap();
        flow.retake().unwrap();
        assert_eq!(flow.state(), FlowState::AwaitingFront);
        assert!(!filled(&flow, Side::Front));
        assert!(!filled(&flow, Side::Back));
    }

    #[test]
    fn retake_needs_a_filled_slot() {
        let mut flow = CaptureFlow::new(CaptureMode::FrontBack);
        let err = flow.retake().unwrap_err();
        assert_eq!(
            err,
            CaptureError::InvalidTransition {
                action: "retake",
                state: "awaiting the front side"
            }
        );
    }

    #[test]
    fn confirm_only_with_every_slot_filled() {
        let mut flow = CaptureFlow::new(CaptureMode::FrontBack);
        flow.record(still(1)).unwrap();
        flow.next_side().unwrap();
        assert!(!flow.can_confirm());
        flow.record(still(2)).unwrap();
        flow.previous_side().unwrap();
        // Reviewing the front with both slots filled.
        assert!(flow.can_confirm());
    }
}
