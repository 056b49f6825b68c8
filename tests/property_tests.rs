//! Property tests for the pure parts: the strength ledger and pair keys.

use proptest::prelude::*;
use starbond::{EngineConfig, InteractionKind, Mode, PairKey, ParticipantId, StrengthLedger};

fn kind() -> impl Strategy<Value = InteractionKind> {
    prop_oneof![
        Just(InteractionKind::Pulse),
        Just(InteractionKind::Whisper),
        Just(InteractionKind::Sing),
        Just(InteractionKind::Gift),
        Just(InteractionKind::Resonance),
        Just(InteractionKind::Proximity),
        "[a-z]{1,8}".prop_map(|s| InteractionKind::from(s.as_str())),
    ]
}

proptest! {
    #[test]
    fn interactions_never_leave_range(start in 0.0f64..=100.0, kinds in prop::collection::vec(kind(), 0..40)) {
        let ledger = StrengthLedger::default();
        let mut strength = start;
        for k in &kinds {
            let next = ledger.clamp(strength + ledger.gain_for(k));
            prop_assert!(next >= strength, "interactions never lower strength");
            prop_assert!(next <= ledger.max_strength());
            strength = next;
        }
    }

    #[test]
    fn mode_is_monotonic_in_strength(a in 0.0f64..=100.0, b in 0.0f64..=100.0) {
        let ledger = StrengthLedger::default();
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(ledger.mode_for(lo, Mode::Silent) <= ledger.mode_for(hi, Mode::Silent));
    }

    #[test]
    fn mode_matches_thresholds(s in 0.0f64..=100.0, current in prop_oneof![Just(Mode::Silent), Just(Mode::Whisper), Just(Mode::Voice)]) {
        let config = EngineConfig::default();
        let ledger = StrengthLedger::from_config(&config);
        let expected = if s >= config.voice_threshold {
            Mode::Voice
        } else if s >= config.whisper_threshold {
            Mode::Whisper
        } else {
            Mode::Silent
        };
        prop_assert_eq!(ledger.mode_for(s, current), expected);
        prop_assert_eq!(ledger.transition(s, current, true), current);
    }

    #[test]
    fn brightness_bounded(s in -50.0f64..=500.0) {
        let b = StrengthLedger::default().brightness_for(s);
        prop_assert!((0.0..=5.0).contains(&b));
    }

    #[test]
    fn pair_key_ignores_order(a in "[a-z0-9]{1,12}", b in "[a-z0-9]{1,12}") {
        let (a, b) = (ParticipantId::from(a), ParticipantId::from(b));
        prop_assume!(a != b);
        let ab = PairKey::new(&a, &b).unwrap();
        let ba = PairKey::new(&b, &a).unwrap();
        prop_assert_eq!(&ab, &ba);
        prop_assert!(ab.low() < ab.high());
        prop_assert_eq!(ab.other(&a), Some(&b));
        prop_assert_eq!(ab.to_string(), format!("{}:{}", ab.low(), ab.high()));
    }

    #[test]
    fn pair_key_rejects_self(a in "[a-z0-9]{1,12}") {
        let a = ParticipantId::from(a);
        prop_assert!(PairKey::new(&a, &a).is_err());
    }
}
