//! Signal slot state machine logic.
//!
//! The whole state of a slot lives in one `u32` so that the generation token and the phase are
//! always observed and transitioned together. The token occupies the upper 16 bits, the phase the
//! lowest 8 bits.
//!
//! The following phases exist:
//!
//! 0 - pending - no outcome yet and no continuation is stored.
//! 1 - awaiting - no outcome yet but a continuation (callback or waker) is stored.
//! 2 - registering - a consumer is writing the continuation field; this phase is a mutex of
//!                   sorts that stops the producer from reading a half-written continuation.
//! 3 - completing - the producer won the completion race and is writing the outcome and
//!                  detaching the continuation; also a mutex that keeps everyone else out.
//! 4 - succeeded - the outcome is a value.
//! 5 - faulted - the outcome is an error reported by the producer.
//! 6 - canceled - the outcome is a cancellation.
//! 7 - consuming - the consumer is taking the outcome and resetting the slot; this is left
//!                 when the slot is stored again as `pending` with the next token.
//!
//! Phases 4-6 are collectively the "completed" phases. Publishing the outcome kind in the phase
//! lets status queries answer without touching the outcome field itself.
//!
//! Transitions:
//!
//! * `pending -> registering -> awaiting` (consumer stores a continuation)
//! * `awaiting -> registering -> awaiting` (consumer replaces a waker on re-poll)
//! * `pending | awaiting -> completing -> succeeded | faulted | canceled` (producer)
//! * `succeeded | faulted | canceled -> consuming -> pending` with token + 1 (consumer)

pub(crate) const PHASE_PENDING: u32 = 0;
pub(crate) const PHASE_AWAITING: u32 = 1;
pub(crate) const PHASE_REGISTERING: u32 = 2;
pub(crate) const PHASE_COMPLETING: u32 = 3;
pub(crate) const PHASE_SUCCEEDED: u32 = 4;
pub(crate) const PHASE_FAULTED: u32 = 5;
pub(crate) const PHASE_CANCELED: u32 = 6;
pub(crate) const PHASE_CONSUMING: u32 = 7;

const PHASE_MASK: u32 = 0xFF;
const TOKEN_SHIFT: u32 = 16;

/// A slot whose token reached this value has used up all its generations. It is never issued to
/// a new source again, so no live handle can ever carry this token.
pub(crate) const EXHAUSTED_TOKEN: u16 = u16::MAX;

#[must_use]
#[allow(clippy::cast_lossless, reason = "u32::from is not usable in const fn")]
pub(crate) const fn pack(token: u16, phase: u32) -> u32 {
    ((token as u32) << TOKEN_SHIFT) | phase
}

#[must_use]
#[expect(
    clippy::cast_possible_truncation,
    reason = "the token occupies exactly the upper 16 bits, the shift leaves nothing else"
)]
pub(crate) const fn token_of(state: u32) -> u16 {
    (state >> TOKEN_SHIFT) as u16
}

#[must_use]
pub(crate) const fn phase_of(state: u32) -> u32 {
    state & PHASE_MASK
}

#[must_use]
pub(crate) const fn is_completed_phase(phase: u32) -> bool {
    matches!(phase, PHASE_SUCCEEDED | PHASE_FAULTED | PHASE_CANCELED)
}

#[must_use]
pub(crate) const fn phase_name(phase: u32) -> &'static str {
    match phase {
        PHASE_PENDING => "pending",
        PHASE_AWAITING => "awaiting",
        PHASE_REGISTERING => "registering",
        PHASE_COMPLETING => "completing",
        PHASE_SUCCEEDED => "succeeded",
        PHASE_FAULTED => "faulted",
        PHASE_CANCELED => "canceled",
        PHASE_CONSUMING => "consuming",
        _ => "invalid",
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn pack_round_trips_extremes() {
        let state = pack(EXHAUSTED_TOKEN, PHASE_CONSUMING);
        assert_eq!(token_of(state), EXHAUSTED_TOKEN);
        assert_eq!(phase_of(state), PHASE_CONSUMING);

        let state = pack(0, PHASE_PENDING);
        assert_eq!(state, 0);
    }

    #[test]
    fn only_outcome_phases_are_completed() {
        let completed: Vec<u32> = (PHASE_PENDING..=PHASE_CONSUMING)
            .filter(|phase| is_completed_phase(*phase))
            .collect();

        assert_eq!(completed, [PHASE_SUCCEEDED, PHASE_FAULTED, PHASE_CANCELED]);
    }

    #[test]
    fn unknown_phase_has_placeholder_name() {
        assert_eq!(phase_name(PHASE_AWAITING), "awaiting");
        assert_eq!(phase_name(0x42), "invalid");
    }
}
