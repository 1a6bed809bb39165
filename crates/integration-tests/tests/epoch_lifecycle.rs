//! Per-epoch accounts: legacy and open variants, claims, force-close.

use claim_ledger::constants::EPOCH_FORCE_CLOSE_GRACE_SECS;
use claim_ledger::{EpochVariant, Instruction, LedgerError, Outcome, PublishMode, TokenTransfer};
use integration_tests::{claimer, records, Harness, ADMIN, MINT, PUBLISHER};

#[test]
fn test_legacy_and_open_epochs_coexist() {
    let mut h = Harness::new("alpha");

    let legacy = h.publish(PublishMode::Legacy, 7, records(3)).unwrap();
    let open = h.publish(PublishMode::Open, 8, records(4)).unwrap();

    let (_, state) = h.ledger.locate_epoch_state(7, &h.subject).unwrap();
    assert_eq!(state.variant, EpochVariant::Legacy);
    let (_, state) = h.ledger.locate_epoch_state(8, &h.subject).unwrap();
    assert_eq!(state.variant, EpochVariant::Open { mint: MINT });
    assert_eq!(state.claim_count, 4);

    h.claim(PublishMode::Legacy, &legacy, 7, &claimer(2)).unwrap();
    h.claim(PublishMode::Open, &open, 8, &claimer(3)).unwrap();
    assert_eq!(h.ledger.tokens().balance(&claimer(2)), 300);
    assert_eq!(h.ledger.tokens().balance(&claimer(3)), 400);

    assert_eq!(
        h.claim(PublishMode::Legacy, &legacy, 7, &claimer(2)),
        Err(LedgerError::AlreadyClaimed)
    );
}

#[test]
fn test_open_preferred_when_both_exist() {
    let mut h = Harness::new("beta");
    let legacy = h.publish(PublishMode::Legacy, 3, records(2)).unwrap();
    let open = h.publish(PublishMode::Open, 3, records(3)).unwrap();
    assert_ne!(legacy.root(), open.root());

    // the lookup resolves to the open account, so only its tree verifies
    assert_eq!(
        h.claim(PublishMode::Legacy, &legacy, 3, &claimer(0)),
        Err(LedgerError::InvalidProof)
    );
    h.claim(PublishMode::Open, &open, 3, &claimer(0)).unwrap();
}

#[test]
fn test_epoch_published_once() {
    let mut h = Harness::new("gamma");
    h.publish(PublishMode::Open, 5, records(2)).unwrap();
    assert_eq!(
        h.publish(PublishMode::Open, 5, records(2)).unwrap_err(),
        LedgerError::EpochAlreadyInitialized
    );
}

#[test]
fn test_unpublished_epoch_is_retryable() {
    let mut h = Harness::new("delta");
    let tree = h.publish(PublishMode::Open, 5, records(2)).unwrap();

    let err = h.claim(PublishMode::Open, &tree, 6, &claimer(0)).unwrap_err();
    assert_eq!(err, LedgerError::EpochNotFound(6));
    assert!(err.is_retryable());
}

#[test]
fn test_force_close_after_grace() {
    let mut h = Harness::new("epsilon");
    let tree = h.publish(PublishMode::Legacy, 9, records(2)).unwrap();
    h.claim(PublishMode::Legacy, &tree, 9, &claimer(1)).unwrap();

    let close = Instruction::ForceCloseEpochState {
        subject: h.subject,
        epoch: 9,
    };
    assert_eq!(h.send(&PUBLISHER, &close), Err(LedgerError::Unauthorized));
    assert!(matches!(
        h.send(&ADMIN, &close),
        Err(LedgerError::GracePeriodNotElapsed { .. })
    ));

    h.ledger.advance_clock(EPOCH_FORCE_CLOSE_GRACE_SECS);
    let before = h.ledger.lamports(&ADMIN);
    let Outcome::Closed { reclaimed, .. } = h.send(&ADMIN, &close).unwrap() else {
        panic!("expected close");
    };
    assert!(reclaimed > 0);
    assert_eq!(h.ledger.lamports(&ADMIN), before + reclaimed);

    // the account is gone; late claims find nothing
    assert_eq!(
        h.claim(PublishMode::Legacy, &tree, 9, &claimer(0)),
        Err(LedgerError::EpochNotFound(9))
    );
}

#[test]
fn test_paused_protocol_blocks_claims() {
    let mut h = Harness::new("zeta");
    let tree = h.publish(PublishMode::Open, 2, records(2)).unwrap();

    h.send(&ADMIN, &Instruction::SetPaused { paused: true }).unwrap();
    let err = h.claim(PublishMode::Open, &tree, 2, &claimer(0)).unwrap_err();
    assert_eq!(err, LedgerError::ProtocolPaused);
    assert!(err.is_retryable());

    h.send(&ADMIN, &Instruction::SetPaused { paused: false }).unwrap();
    h.claim(PublishMode::Open, &tree, 2, &claimer(0)).unwrap();
}
