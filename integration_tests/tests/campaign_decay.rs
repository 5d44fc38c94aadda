mod common;

use approval_core::{ActorId, ApprovalError, AuditQuery, CampaignStatus, SegmentId, SourceKind};

use common::{assert_close, fixture_engine};

#[test]
fn campaign_boost_then_ten_decay_turns() {
    let engine = fixture_engine(&[1]);
    let campaign = engine
        .start_campaign_with_boost(ActorId(1), SegmentId(2), 0, 4)
        .expect("campaign starts");
    assert_eq!(campaign.end_turn, 12);

    let sweep = engine.complete_due_campaigns(12);
    assert_eq!(sweep.completed.len(), 1);
    assert_close(engine.get_approval(ActorId(1), SegmentId(2)).unwrap(), 54.0, 1e-5);

    for turn in 13..=22 {
        engine.apply_turn_decay(turn);
    }
    // 50 + 4 * 0.98^10
    assert_close(engine.get_approval(ActorId(1), SegmentId(2)).unwrap(), 53.268, 0.05);

    let history = engine.query_audit(&AuditQuery::new().segment(SegmentId(2)));
    assert_eq!(history.len(), 11);
    assert_eq!(history[0].source, SourceKind::Campaign);
    assert!(history[1..]
        .iter()
        .all(|change| change.source == SourceKind::Decay && change.delta < 0.0));
}

#[test]
fn second_campaign_on_same_pair_conflicts() {
    let engine = fixture_engine(&[1, 2]);
    let first = engine
        .start_campaign_with_boost(ActorId(1), SegmentId(3), 0, 2)
        .expect("first campaign");

    let err = engine
        .start_campaign(ActorId(1), SegmentId(3), 4)
        .expect_err("pair already campaigning");
    assert!(matches!(
        err,
        ApprovalError::CampaignConflict { existing, .. } if existing == first.id
    ));
    assert_eq!(
        engine.campaign(first.id).map(|c| c.status()),
        Some(CampaignStatus::Active)
    );

    engine
        .start_campaign(ActorId(1), SegmentId(4), 4)
        .expect("other segment is free");
    engine
        .start_campaign(ActorId(2), SegmentId(3), 4)
        .expect("other actor is free");
    assert_eq!(engine.campaigns_for(ActorId(1)).len(), 2);
}

#[test]
fn completion_is_idempotent_and_catches_up() {
    let engine = fixture_engine(&[1]);
    let campaign = engine
        .start_campaign_with_boost(ActorId(1), SegmentId(1), 3, 5)
        .expect("campaign starts");

    let err = engine
        .complete_campaign(campaign.id, 14)
        .expect_err("ends at turn 15");
    assert!(matches!(err, ApprovalError::CampaignNotDue { end_turn: 15, .. }));

    // turn 15 was skipped; the sweep at 17 still pays out once
    assert_eq!(engine.complete_due_campaigns(17).completed.len(), 1);
    assert!(engine.complete_due_campaigns(17).completed.is_empty());
    assert_eq!(engine.complete_campaign(campaign.id, 18).unwrap(), None);
    assert_close(engine.get_approval(ActorId(1), SegmentId(1)).unwrap(), 55.0, 1e-5);
}

#[test]
fn cancelled_campaign_never_pays_out() {
    let engine = fixture_engine(&[1]);
    let campaign = engine
        .start_campaign(ActorId(1), SegmentId(5), 0)
        .expect("campaign starts");
    assert!((1..=5).contains(&campaign.boost));

    assert_eq!(
        engine.cancel_campaign(campaign.id).unwrap(),
        CampaignStatus::Cancelled
    );
    assert_eq!(
        engine.cancel_campaign(campaign.id).unwrap(),
        CampaignStatus::Cancelled
    );
    assert!(engine.complete_due_campaigns(40).completed.is_empty());
    assert_eq!(engine.get_approval(ActorId(1), SegmentId(5)).unwrap(), 50.0);

    engine
        .start_campaign(ActorId(1), SegmentId(5), 1)
        .expect("pair is free again");
}

#[test]
fn invalid_campaign_requests_are_rejected() {
    let engine = fixture_engine(&[1]);
    let err = engine
        .start_campaign_with_boost(ActorId(1), SegmentId(1), 0, 9)
        .expect_err("boost above five");
    assert_eq!(err.kind(), approval_core::ErrorKind::Validation);
    let err = engine
        .start_campaign(ActorId(1), SegmentId(77), 0)
        .expect_err("unknown segment");
    assert_eq!(err.kind(), approval_core::ErrorKind::NotFound);
    let err = engine
        .start_campaign(ActorId(8), SegmentId(1), 0)
        .expect_err("unknown actor");
    assert_eq!(err.kind(), approval_core::ErrorKind::NotFound);
}
