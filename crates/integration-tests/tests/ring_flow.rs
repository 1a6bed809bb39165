//! Ring-mode channels: publish, claim, overwrite.

use claim_ledger::{LedgerError, Outcome, PublishMode, TokenTransfer, TransferFee};
use integration_tests::{claimer, records, Harness, PUBLISHER, TREASURY, TREASURY_FUNDS};
use merkle_gen::{Address, AllocationRecord};

#[test]
fn test_two_participants_claim_once() {
    let mut h = Harness::new("alpha");
    h.prepare(PublishMode::Ring);

    let alice = Address([0xa1; 32]);
    let bob = Address([0xb2; 32]);
    let tree = h
        .publish(
            PublishMode::Ring,
            1,
            vec![
                AllocationRecord::new(alice, 0, 100, "a"),
                AllocationRecord::new(bob, 1, 250, "b"),
            ],
        )
        .unwrap();

    h.claim(PublishMode::Ring, &tree, 1, &alice).unwrap();
    h.claim(PublishMode::Ring, &tree, 1, &bob).unwrap();
    assert_eq!(h.ledger.tokens().balance(&alice), 100);
    assert_eq!(h.ledger.tokens().balance(&bob), 250);
    assert_eq!(h.ledger.tokens().balance(&TREASURY), TREASURY_FUNDS - 350);

    let again = h.claim(PublishMode::Ring, &tree, 1, &alice).unwrap_err();
    assert_eq!(again, LedgerError::AlreadyClaimed);
    assert!(again.is_benign());
    assert_eq!(h.ledger.tokens().balance(&alice), 100);
}

#[test]
fn test_ring_keeps_last_ten_epochs() {
    let mut h = Harness::new("beta");
    h.prepare(PublishMode::Ring);

    let mut trees = Vec::new();
    for epoch in 1..=12u64 {
        trees.push(h.publish(PublishMode::Ring, epoch, records(3)).unwrap());
    }

    // epochs 1 and 2 were replaced by 11 and 12
    for (epoch, resident) in [(1u64, 11u64), (2, 12)] {
        assert_eq!(
            h.claim(PublishMode::Ring, &trees[0], epoch, &claimer(0)),
            Err(LedgerError::SlotEpochMismatch {
                requested: epoch,
                resident
            })
        );
    }

    // epochs 3..=12 remain claimable
    for epoch in 3..=12u64 {
        let tree = &trees[usize::try_from(epoch - 1).unwrap()];
        assert!(h.claim(PublishMode::Ring, tree, epoch, &claimer(1)).is_ok());
    }
    assert_eq!(h.ledger.tokens().balance(&claimer(1)), 10 * 200);

    let ring = h.ledger.channel(&h.subject).unwrap().unwrap();
    assert_eq!(ring.resident_epochs(), (3..=12).collect::<Vec<_>>());
    assert_eq!(ring.latest_epoch, 12);
}

#[test]
fn test_overwrite_clears_claims() {
    let mut h = Harness::new("gamma");
    h.prepare(PublishMode::Ring);

    let first = h.publish(PublishMode::Ring, 4, records(2)).unwrap();
    h.claim(PublishMode::Ring, &first, 4, &claimer(0)).unwrap();

    // same claimer set, new epoch in the same slot
    let second = h.publish(PublishMode::Ring, 14, records(2)).unwrap();
    assert_eq!(first.root(), second.root());
    h.claim(PublishMode::Ring, &second, 14, &claimer(0)).unwrap();
    assert_eq!(h.ledger.tokens().balance(&claimer(0)), 200);
}

#[test]
fn test_republish_corrects_root() {
    let mut h = Harness::new("delta");
    h.prepare(PublishMode::Ring);
    let wrong = h.publish(PublishMode::Ring, 5, records(1)).unwrap();

    let fixed = h.publish(PublishMode::Ring, 5, records(2)).unwrap();
    assert_ne!(wrong.root(), fixed.root());
    assert_eq!(
        h.claim(PublishMode::Ring, &wrong, 5, &claimer(0)),
        Err(LedgerError::InvalidProof)
    );
    h.claim(PublishMode::Ring, &fixed, 5, &claimer(1)).unwrap();
    assert_eq!(h.ledger.channel(&h.subject).unwrap().unwrap().root_for(5), Some(fixed.root()));
}

#[test]
fn test_older_epoch_takes_over_slot() {
    let mut h = Harness::new("eta");
    h.prepare(PublishMode::Ring);
    let newer = h.publish(PublishMode::Ring, 15, records(1)).unwrap();
    let older = h.publish(PublishMode::Ring, 5, records(2)).unwrap();

    assert_eq!(
        h.claim(PublishMode::Ring, &newer, 15, &claimer(0)),
        Err(LedgerError::EpochNotFound(15))
    );
    h.claim(PublishMode::Ring, &older, 5, &claimer(0)).unwrap();
    assert_eq!(h.ledger.channel(&h.subject).unwrap().unwrap().latest_epoch, 15);
}

#[test]
fn test_transfer_fee_withheld_from_claimer() {
    let fee = TransferFee::new(100, 5).unwrap();
    let mut h = Harness::with_fee("epsilon", fee);
    h.prepare(PublishMode::Ring);

    let whale = Address([0xee; 32]);
    let minnow = Address([0x11; 32]);
    let tree = h
        .publish(
            PublishMode::Ring,
            1,
            vec![
                AllocationRecord::new(whale, 0, 10_000, "w"),
                AllocationRecord::new(minnow, 1, 150, "m"),
            ],
        )
        .unwrap();

    let Outcome::Claimed(receipt) = h.claim(PublishMode::Ring, &tree, 1, &whale).unwrap() else {
        panic!("expected a claim");
    };
    // 1% of 10_000 is 100, capped at 5
    assert_eq!((receipt.gross, receipt.fee, receipt.net), (10_000, 5, 9_995));

    let Outcome::Claimed(receipt) = h.claim(PublishMode::Ring, &tree, 1, &minnow).unwrap() else {
        panic!("expected a claim");
    };
    // ceil(1.5) = 2
    assert_eq!((receipt.fee, receipt.net), (2, 148));
    assert_eq!(h.ledger.tokens().withheld(), 7);
}

#[test]
fn test_unknown_publisher_rejected() {
    let mut h = Harness::new("zeta");
    h.prepare(PublishMode::Ring);
    let stranger = Address([0x55; 32]);
    let instruction = PublishMode::Ring.publish_instruction(h.subject, 1, [1; 32], 1);

    assert_eq!(h.send(&stranger, &instruction), Err(LedgerError::Unauthorized));
    assert!(h.send(&PUBLISHER, &instruction).is_ok());
}
