//! Scale-down integration tests against a simulated cluster.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use scaleprobe_core::{ClusterDescriptor, EngineSettings, PriceTable};
use scaleprobe_placement::{Placer, SimulatedCluster};
use scaleprobe_recommend::*;
use scaleprobe_state::*;

const GI: u64 = 1 << 30;

fn settings() -> EngineSettings {
    EngineSettings {
        poll_interval_ms: 5,
        scale_down_timeout_ms: 40,
        ..Default::default()
    }
}

fn prices() -> Arc<PriceTable> {
    Arc::new(
        PriceTable::default()
            .with_price("m5.xlarge", 30.0)
            .with_price("m5.large", 10.0),
    )
}

fn unit(name: &str, machine_type: &str, mem_gi: u64, pre_existing: bool) -> CapacityUnit {
    let mut unit_labels = BTreeMap::new();
    unit_labels.insert(labels::INSTANCE_TYPE.to_string(), machine_type.to_string());
    unit_labels.insert(labels::ZONE.to_string(), "eu-west-1a".to_string());
    if pre_existing {
        unit_labels.insert(labels::PRE_EXISTING.to_string(), "true".to_string());
    }
    CapacityUnit {
        name: name.to_string(),
        labels: unit_labels,
        allocatable: Resources::new(4000, mem_gi * GI),
        capacity: Resources::new(4000, mem_gi * GI),
        max_workload: 110,
        taints: Vec::new(),
        unschedulable: false,
        created_at: 0,
    }
}

fn pod(name: &str, mem_gi: u64) -> WorkloadUnit {
    WorkloadUnit::pending(name, Resources::new(100, mem_gi * GI))
}

/// Place `pod` on `unit` by cordoning every other unit while it lands.
fn place_on(cluster: &SimulatedCluster, unit: &str, pods: &[WorkloadUnit]) {
    let others: Vec<_> = cluster
        .list_units()
        .unwrap()
        .into_iter()
        .filter(|u| u.name != unit)
        .map(|u| u.name)
        .collect();
    for other in &others {
        cluster.taint_unit(other).unwrap();
    }
    cluster.create_workload(pods).unwrap();
    for other in &others {
        cluster.untaint_unit(other).unwrap();
    }
}

fn setup(units: &[CapacityUnit]) -> (Arc<SimulatedCluster>, ScaleDownRecommender) {
    let cluster = Arc::new(SimulatedCluster::in_memory(Placer::new()).unwrap());
    cluster.add_units(units).unwrap();
    let recommender = ScaleDownRecommender::new(cluster.clone(), prices(), settings());
    (cluster, recommender)
}

fn ctx() -> RunContext {
    RunContext::with_timeout(Duration::from_secs(10))
}

fn workload_on(cluster: &SimulatedCluster, unit: &str) -> usize {
    cluster
        .list_workload()
        .unwrap()
        .iter()
        .filter(|w| w.node_name.as_deref() == Some(unit))
        .count()
}

#[tokio::test]
async fn tests_units_in_non_increasing_price_order() {
    let units = vec![
        unit("c", "m5.large", 8, false),
        unit("a", "m5.xlarge", 8, false),
        unit("b", "m5.xlarge", 8, false),
    ];
    let (cluster, recommender) = setup(&units);

    let removable = recommender.run(&ctx(), &units).await.unwrap();
    assert_eq!(removable, vec!["a", "b", "c"]);
    assert!(cluster.list_units().unwrap().is_empty());
}

#[tokio::test]
async fn unplaceable_copy_rolls_back_the_unit() {
    let units = vec![
        unit("n1", "m5.xlarge", 8, false),
        unit("n2", "m5.large", 8, true),
    ];
    let (cluster, recommender) = setup(&units);
    place_on(&cluster, "n1", &[pod("big", 6), pod("tiny", 1)]);
    place_on(&cluster, "n2", &[pod("resident", 4)]);

    // n2 has 4Gi free: the 1Gi copy lands, the 6Gi copy cannot.
    let removable = recommender.run(&ctx(), &units[..1]).await.unwrap();
    assert!(removable.is_empty());

    let n1 = cluster
        .list_units()
        .unwrap()
        .into_iter()
        .find(|u| u.name == "n1")
        .unwrap();
    assert!(!n1.unschedulable);
    assert_eq!(workload_on(&cluster, "n1"), 2);
    assert_eq!(workload_on(&cluster, "n2"), 1);
    let workload = cluster.list_workload().unwrap();
    assert_eq!(workload.len(), 3);
    assert!(workload.iter().all(|w| !w.labels.contains_key(labels::RELOCATED_FROM)));
}

#[tokio::test]
async fn relocatable_unit_is_removed_and_copies_kept() {
    let units = vec![
        unit("n1", "m5.xlarge", 8, false),
        unit("n2", "m5.large", 8, false),
    ];
    let (cluster, recommender) = setup(&units);
    place_on(&cluster, "n1", &[pod("web", 2)]);

    let removable = recommender.run(&ctx(), &units).await.unwrap();
    // n1 goes first; n2 then holds the only copy and nowhere else is left.
    assert_eq!(removable, vec!["n1"]);

    let remaining: Vec<_> = cluster.list_units().unwrap().into_iter().map(|u| u.name).collect();
    assert_eq!(remaining, vec!["n2"]);
    assert!(!cluster.list_units().unwrap()[0].unschedulable);

    let workload = cluster.list_workload().unwrap();
    assert_eq!(workload.len(), 1);
    assert_ne!(workload[0].name, "web");
    assert_eq!(workload[0].node_name.as_deref(), Some("n2"));
    assert!(workload[0].has_label(labels::RELOCATED_FROM, "n1"));
}

#[tokio::test]
async fn pre_existing_units_are_never_candidates() {
    let units = vec![
        unit("old", "m5.xlarge", 8, true),
        unit("new", "m5.large", 8, false),
    ];
    let (cluster, recommender) = setup(&units);

    let removable = recommender.run(&ctx(), &units).await.unwrap();
    assert_eq!(removable, vec!["new"]);
    let remaining: Vec<_> = cluster.list_units().unwrap().into_iter().map(|u| u.name).collect();
    assert_eq!(remaining, vec!["old"]);
}

#[tokio::test]
async fn run_deadline_rolls_back_and_fails() {
    let units = vec![unit("n1", "m5.xlarge", 8, false)];
    let (cluster, recommender) = setup(&units);
    place_on(&cluster, "n1", &[pod("web", 2)]);

    let short = RunContext::with_timeout(Duration::from_millis(15));
    let err = recommender.run(&short, &units).await.unwrap_err();
    assert!(matches!(
        err,
        RecommendError::Timeout {
            cause: StopCause::RunDeadline,
            ..
        }
    ));

    let units = cluster.list_units().unwrap();
    assert_eq!(units.len(), 1);
    assert!(!units[0].unschedulable);
    assert_eq!(cluster.list_workload().unwrap().len(), 1);
}

#[tokio::test]
async fn facade_tests_every_unit_when_none_named() {
    let descriptor = Arc::new(
        ClusterDescriptor::from_toml_str(
            r#"
[cluster]
name = "demo"
"#,
        )
        .unwrap(),
    );
    let cluster = Arc::new(SimulatedCluster::in_memory(Placer::new()).unwrap());
    cluster
        .add_units(&[unit("a", "m5.large", 8, false), unit("b", "m5.xlarge", 8, true)])
        .unwrap();

    let recommender = Recommender::new(cluster.clone(), descriptor, "demo", prices(), settings());
    let removable = recommender.run_scale_down(&ctx(), None).await.unwrap();
    assert_eq!(removable, vec!["a"]);
}
