//! Delivery Orchestrator Tests
//!
//! Request-path behavior against a real dispatch plan store and plugin
//! registry: allocation accounting, per-position failure isolation,
//! cancellation and the serialization chain.

use std::sync::Arc;

use serde_json::Value;
use spotline_core::{MonitoringEvent, PositionOrGroup, TimeBucket};
use spotline_plan::{DispatchPlanStore, PlanSnapshot, StackReorganizer};
use spotline_plugin::builtin::{PlanOrderPolicy, SERIALIZER_PARAMETER};
use spotline_plugin::{
    MaterialCandidate, PluginError, PluginInstance, PluginRegistry, PluginVersion,
    SerializerLevel,
};
use spotline_runtime::{
    ConfigurationCache, DeliveryError, DeliveryOrchestrator, DeliveryResponse, Monitor, Stage,
};
use spotline_testkit::*;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const SERVICE: &str = "spotline-dispatch";

struct Harness {
    store: Arc<DispatchPlanStore>,
    registry: Arc<PluginRegistry>,
    clock: Arc<ManualClock>,
    events: mpsc::Receiver<MonitoringEvent>,
    orchestrator: DeliveryOrchestrator,
}

impl Harness {
    fn new(plan: PlanSnapshot, collections: ConfigCollections) -> Self {
        let store = Arc::new(DispatchPlanStore::new());
        store.load(plan).unwrap();
        let registry = builtin_registry();
        let cache = Arc::new(ConfigurationCache::new(
            Arc::new(InMemoryConfigSource::new(collections.clone())),
            SERVICE,
        ));
        cache.publish(collections.to_snapshot(SERVICE));
        let (monitor, events) = Monitor::channel(1_024);
        let clock = Arc::new(ManualClock::at_bucket(NOW));
        let orchestrator = DeliveryOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&registry),
            cache,
            Arc::new(monitor),
            clock.clone(),
        );
        Self {
            store,
            registry,
            clock,
            events,
            orchestrator,
        }
    }

    fn serve(&self, codes: &[&str]) -> DeliveryResponse {
        self.orchestrator
            .serve(&request(codes.iter().copied()), &CancellationToken::new())
    }

    fn drain_events(&mut self) -> Vec<MonitoringEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}

fn payload(response: &DeliveryResponse) -> Value {
    serde_json::from_str(&response.payload).unwrap()
}

fn positions(response: &DeliveryResponse) -> Vec<u64> {
    payload(response)["positions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|position| position["position"].as_u64().unwrap())
        .collect()
}

// ============================================================================
// Allocation Accounting
// ============================================================================

#[test]
fn test_grants_exactly_the_remaining_count() {
    let mut harness = Harness::new(plan_at(NOW, &[(AD_A, 2)]), standard_collections());

    let granted: Vec<usize> = (0..3).map(|_| harness.serve(&[PRE_ROLL]).granted).collect();

    assert_eq!(granted, vec![1, 1, 0]);
    assert_eq!(harness.store.remaining(NOW, MEDIA, &AD_A, 0), Some(0));

    harness.store.advance_bucket(NOW, NOW.next()).unwrap();
    assert_eq!(harness.store.remaining(NOW.next(), MEDIA, &AD_A, 1), Some(0));

    let names: Vec<&str> = harness.drain_events().iter().map(MonitoringEvent::name).collect();
    assert_eq!(names.iter().filter(|name| **name == "request_received").count(), 3);
    assert_eq!(names.iter().filter(|name| **name == "ad_returned").count(), 2);
}

#[test]
fn test_payload_nests_ads_under_positions() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 1), (AD_B, 4)]), standard_collections());

    let response = harness.serve(&[PRE_ROLL]);

    assert!(response.is_done());
    assert!(response.failures.is_empty());
    let value = payload(&response);
    assert_eq!(value["positions"][0]["position"], PRE_POSITION.get());
    // remaining-count scorer prefers the fuller ad
    assert_eq!(value["positions"][0]["ads"][0]["material"], 200);
    assert_eq!(value["positions"][0]["ads"][0]["sequence"], 0);
    assert_eq!(harness.store.remaining(NOW, MEDIA, &AD_B, 0), Some(3));
}

#[test]
fn test_exhausted_plan_still_returns_a_payload() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 0)]), standard_collections());

    let response = harness.serve(&[PRE_ROLL]);

    assert!(response.is_done());
    assert_eq!(response.granted, 0);
    assert!(positions(&response).is_empty());
}

#[test]
fn test_reorganized_slot_is_served_at_its_sequence() {
    let mut collections = standard_collections();
    collections.bind_policy(PositionOrGroup::Position(PRE_POSITION), "scripted");
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 3)]), collections);
    let candidate = MaterialCandidate::from_creative(&creative(AD_A, 100));
    harness.registry.register(
        "scripted",
        PluginVersion::new(1, 0, 0),
        PluginInstance::policy(ScriptedPolicy::new(vec![candidate.clone(), candidate])),
    );

    assert_eq!(harness.serve(&[PRE_ROLL]).granted, 1);

    // Pass at NOW+1 moves NOW into NOW+2, one slot down
    let reorganizer = StackReorganizer::new(Arc::clone(&harness.store), 60);
    reorganizer.run_pass(NOW.next()).unwrap();
    harness.clock.set(NOW.offset(2).start());

    let response = harness.serve(&[PRE_ROLL]);
    assert_eq!(response.granted, 1);
    assert_eq!(payload(&response)["positions"][0]["ads"][0]["sequence"], 1);
    assert_eq!(harness.store.remaining(NOW.offset(2), MEDIA, &AD_A, 1), Some(1));
}

#[test]
fn test_group_code_fills_every_member_position() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), standard_collections());

    let response = harness.serve(&[BREAK]);

    assert_eq!(response.granted, 2);
    assert_eq!(positions(&response), vec![PRE_POSITION.get(), MID_POSITION.get()]);
    assert_eq!(harness.store.remaining(NOW, MEDIA, &AD_A, 0), Some(3));
}

#[test]
fn test_positions_keep_request_order() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), standard_collections());

    let response = harness.serve(&[MID_ROLL, PRE_ROLL]);

    assert_eq!(positions(&response), vec![MID_POSITION.get(), PRE_POSITION.get()]);
}

// ============================================================================
// Failure Isolation
// ============================================================================

#[test]
fn test_panicking_policy_costs_only_its_position() {
    let mut collections = standard_collections();
    collections.bind_policy(PositionOrGroup::Position(MID_POSITION), "panicky");
    let mut harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), collections);
    harness.registry.register(
        "panicky",
        PluginVersion::new(1, 0, 0),
        PluginInstance::policy(PanickingPolicy::new("boom")),
    );

    let response = harness.serve(&[PRE_ROLL, MID_ROLL]);

    assert!(response.is_done());
    assert_eq!(response.granted, 1);
    assert_eq!(positions(&response), vec![PRE_POSITION.get()]);
    assert_eq!(response.failures.len(), 1);
    let failure = &response.failures[0];
    assert_eq!(failure.code, MID_ROLL);
    assert_eq!(failure.stage, Stage::RunPolicy);
    assert!(matches!(
        &failure.error,
        DeliveryError::PluginPanicked { message, .. } if message == "boom"
    ));

    let failed: Vec<MonitoringEvent> = harness
        .drain_events()
        .into_iter()
        .filter(|event| event.name() == "delivery_failed")
        .collect();
    assert_eq!(failed.len(), 1);
}

#[test]
fn test_failing_policy_is_reported_at_run_policy() {
    let mut collections = standard_collections();
    collections.bind_policy(PositionOrGroup::Position(PRE_POSITION), "failing");
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), collections);
    harness.registry.register(
        "failing",
        PluginVersion::new(1, 0, 0),
        PluginInstance::policy(FailingPolicy::new("failing")),
    );

    let response = harness.serve(&[PRE_ROLL, MID_ROLL]);

    assert_eq!(response.granted, 1);
    assert_eq!(response.failures[0].stage, Stage::RunPolicy);
    assert!(matches!(response.failures[0].error, DeliveryError::Plugin(PluginError::Failed { .. })));
}

#[test]
fn test_unknown_code_is_skipped_silently() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), standard_collections());

    let response = harness.serve(&["no-such-code", PRE_ROLL]);

    assert!(response.failures.is_empty());
    assert_eq!(response.granted, 1);
}

#[test]
fn test_code_without_pipeline_fails_at_resolution() {
    let mut collections = standard_collections();
    collections.pipelines.retain(|pipeline| {
        pipeline.target != PositionOrGroup::Position(MID_POSITION)
    });
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), collections);

    let response = harness.serve(&[MID_ROLL, PRE_ROLL]);

    assert_eq!(response.granted, 1);
    assert_eq!(response.failures.len(), 1);
    assert_eq!(response.failures[0].stage, Stage::ResolvePipeline);
    assert!(matches!(response.failures[0].error, DeliveryError::UnknownPipeline { .. }));
}

#[test]
fn test_unregistered_policy_fails_at_resolution() {
    let mut collections = standard_collections();
    collections.bind_policy(PositionOrGroup::Position(PRE_POSITION), "not-registered");
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), collections);

    let response = harness.serve(&[PRE_ROLL]);

    assert_eq!(response.granted, 0);
    assert!(matches!(
        &response.failures[0].error,
        DeliveryError::Plugin(err) if err.is_not_found()
    ));
    assert_eq!(harness.store.remaining(NOW, MEDIA, &AD_A, 0), Some(5));
}

// ============================================================================
// Serialization Chain
// ============================================================================

#[test]
fn test_ad_serializer_failure_drops_only_that_position() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), standard_collections());
    harness.registry.register(
        "picky",
        PluginVersion::new(1, 0, 0),
        PluginInstance::serializer(LevelFailingSerializer::at_position(
            SerializerLevel::Ad,
            MID_POSITION,
        )),
    );
    let request = request([PRE_ROLL, MID_ROLL]).with_parameter(SERIALIZER_PARAMETER, "picky");

    let response = harness
        .orchestrator
        .serve(&request, &CancellationToken::new());

    assert!(response.is_done());
    assert_eq!(response.granted, 2);
    assert_eq!(positions(&response), vec![PRE_POSITION.get()]);
    assert_eq!(response.failures.len(), 1);
    assert_eq!(response.failures[0].stage, Stage::SerializePerAd);
    assert_eq!(response.failures[0].position, Some(MID_POSITION));
}

#[test]
fn test_global_serializer_failure_empties_the_payload() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), standard_collections());
    harness.registry.register(
        "no-global",
        PluginVersion::new(1, 0, 0),
        PluginInstance::serializer(LevelFailingSerializer::at(SerializerLevel::Global)),
    );
    let request = request([PRE_ROLL]).with_parameter(SERIALIZER_PARAMETER, "no-global");

    let response = harness
        .orchestrator
        .serve(&request, &CancellationToken::new());

    assert_eq!(response.stage, Stage::Failed);
    assert!(response.payload.is_empty());
    assert_eq!(response.granted, 1);
    let last = response.failures.last().unwrap();
    assert_eq!(last.code, "*");
    assert_eq!(last.stage, Stage::SerializeGlobal);
}

// ============================================================================
// Cancellation
// ============================================================================

#[test]
fn test_cancelled_request_allocates_nothing() {
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), standard_collections());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let response = harness.orchestrator.serve(&request([PRE_ROLL]), &cancel);

    assert_eq!(response.stage, Stage::Failed);
    assert_eq!(response.granted, 0);
    assert!(response
        .failures
        .iter()
        .all(|failure| matches!(failure.error, DeliveryError::Cancelled { .. })));
    assert_eq!(harness.store.remaining(NOW, MEDIA, &AD_A, 0), Some(5));
}

#[test]
fn test_allocation_survives_cancellation_after_policy() {
    let mut collections = standard_collections();
    collections.bind_policy(PositionOrGroup::Position(PRE_POSITION), "cancelling");
    let harness = Harness::new(plan_at(NOW, &[(AD_A, 5)]), collections);
    let cancel = CancellationToken::new();
    harness.registry.register(
        "cancelling",
        PluginVersion::new(1, 0, 0),
        PluginInstance::policy(CancellingPolicy::new(cancel.clone(), PlanOrderPolicy)),
    );

    let response = harness.orchestrator.serve(&request([PRE_ROLL]), &cancel);

    assert_eq!(response.granted, 1);
    assert_eq!(response.stage, Stage::Failed);
    assert_eq!(response.failures[0].stage, Stage::SerializePerAd);
    assert_eq!(harness.store.remaining(NOW, MEDIA, &AD_A, 0), Some(4));
}

#[test]
fn test_request_outside_any_bucket_serves_empty() {
    let harness = Harness::new(
        plan_at(TimeBucket::from_epoch_minutes(1), &[(AD_A, 5)]),
        standard_collections(),
    );

    let response = harness.serve(&[PRE_ROLL]);

    assert!(response.is_done());
    assert_eq!(response.granted, 0);
}
