//! Cumulative channels: one advancing root.

use claim_ledger::{LedgerError, PublishMode, TokenTransfer};
use integration_tests::{claimer, records, Harness, ADMIN};

#[test]
fn test_only_latest_root_claimable() {
    let mut h = Harness::new("alpha");
    h.prepare(PublishMode::Cumulative);

    let first = h.publish(PublishMode::Cumulative, 10, records(2)).unwrap();
    h.claim(PublishMode::Cumulative, &first, 10, &claimer(0)).unwrap();

    let second = h.publish(PublishMode::Cumulative, 11, records(3)).unwrap();
    assert_eq!(
        h.claim(PublishMode::Cumulative, &first, 10, &claimer(1)),
        Err(LedgerError::SlotEpochMismatch {
            requested: 10,
            resident: 11
        })
    );
    assert_eq!(
        h.claim(PublishMode::Cumulative, &second, 12, &claimer(1)),
        Err(LedgerError::EpochNotFound(12))
    );

    h.claim(PublishMode::Cumulative, &second, 11, &claimer(1)).unwrap();
    h.claim(PublishMode::Cumulative, &second, 11, &claimer(0)).unwrap();
    assert_eq!(h.ledger.tokens().balance(&claimer(0)), 200);

    let channel = h.ledger.cumulative_channel(&h.subject).unwrap().unwrap();
    assert_eq!((channel.root_seq, channel.epoch), (2, 11));
    assert_eq!(channel.root, second.root());
}

#[test]
fn test_epoch_must_increase() {
    let mut h = Harness::new("beta");
    h.prepare(PublishMode::Cumulative);
    h.publish(PublishMode::Cumulative, 4, records(1)).unwrap();

    assert_eq!(
        h.publish(PublishMode::Cumulative, 3, records(1)).unwrap_err(),
        LedgerError::EpochNotIncreasing {
            epoch: 3,
            resident: 4
        }
    );
}

#[test]
fn test_requires_initialized_channel() {
    let mut h = Harness::new("gamma");
    assert_eq!(
        h.publish(PublishMode::Cumulative, 1, records(1)).unwrap_err(),
        LedgerError::ChannelNotInitialized
    );
}

#[test]
fn test_admin_publishes_while_paused() {
    let mut h = Harness::new("delta");
    h.prepare(PublishMode::Cumulative);
    h.send(&ADMIN, &claim_ledger::Instruction::SetPaused { paused: true })
        .unwrap();

    assert_eq!(
        h.publish(PublishMode::Cumulative, 1, records(1)).unwrap_err(),
        LedgerError::ProtocolPaused
    );

    let instruction = PublishMode::Cumulative.publish_instruction(h.subject, 1, [7; 32], 1);
    assert!(h.send(&ADMIN, &instruction).is_ok());
}
