use agency_sync::audit::BindingAuditor;
use agency_sync::lock::AccountLocks;
use agency_sync::throttle::{Throttle, Unthrottled};
use agency_sync::{
    AgencySyncConfig, EnterpriseProjectRoles, ProjectRoles, ReconcileService, ScopeKind,
    create_enterprise_project_client, create_iam_client,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use testing::{BindingFamily, FakeCloud, unique_agency_id};

const DOMAIN: &str = "domain-1";

async fn cloud() -> FakeCloud {
    let cloud = FakeCloud::start(DOMAIN).await;
    cloud.add_system_role("r-admin", "Admin");
    cloud.add_system_role("r-viewer", "Viewer");
    cloud.add_system_role("r-net", "NetworkAdmin");
    cloud.add_project("p-b", "proj-b");
    cloud.add_project("p-mos", "MOS");
    cloud.add_project("p-a", "proj-a");
    cloud.add_enterprise_project("ep-1", "ep-prod");
    cloud
}

fn config(cloud: &FakeCloud) -> AgencySyncConfig {
    AgencySyncConfig {
        iam_endpoint: cloud.uri(),
        enterprise_project_endpoint: Some(cloud.uri()),
        domain_id: DOMAIN.to_string(),
        auth_token: "test-token".to_string(),
        ..Default::default()
    }
}

fn auditor(config: &AgencySyncConfig) -> BindingAuditor {
    let iam = create_iam_client(config).unwrap();
    let enterprise = create_enterprise_project_client(config).unwrap();
    BindingAuditor::new(config, iam, enterprise).with_throttle(Arc::new(Unthrottled))
}

#[derive(Default)]
struct CountingThrottle {
    acquired: AtomicU32
}

#[async_trait::async_trait]
impl Throttle for CountingThrottle {
    async fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }
}

fn roles(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(ToString::to_string).collect()
}

fn bind_everything(cloud: &FakeCloud, agency: &str) {
    cloud.bind(BindingFamily::Project, "p-a", agency, "r-admin");
    cloud.bind(BindingFamily::Project, "p-b", agency, "r-viewer");
    cloud.bind(BindingFamily::Project, "p-mos", agency, "r-admin");
    cloud.bind(BindingFamily::Domain, DOMAIN, agency, "r-viewer");
    cloud.bind(BindingFamily::Inherited, DOMAIN, agency, "r-net");
    cloud.bind(BindingFamily::EnterpriseProject, "ep-1", agency, "r-viewer");
}

#[tokio::test]
async fn test_audit_rebuilds_every_scope_kind() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    bind_everything(&cloud, &agency);

    let report = auditor(&config(&cloud)).audit(&agency).await.unwrap();

    assert!(report.is_complete());
    assert_eq!(
        report.bindings.project_roles,
        vec![
            ProjectRoles {
                project: "proj-a".to_string(),
                roles: roles(&["Admin"])
            },
            ProjectRoles {
                project: "proj-b".to_string(),
                roles: roles(&["Viewer"])
            }
        ]
    );
    assert_eq!(report.bindings.domain_roles, roles(&["Viewer"]));
    assert_eq!(report.bindings.all_resources_roles, roles(&["NetworkAdmin"]));
    assert_eq!(
        report.bindings.enterprise_project_roles,
        vec![EnterpriseProjectRoles {
            enterprise_project: "ep-prod".to_string(),
            roles: roles(&["Viewer"])
        }]
    );
}

#[tokio::test]
async fn test_audit_never_queries_reserved_projects() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    bind_everything(&cloud, &agency);

    let report = auditor(&config(&cloud)).audit(&agency).await.unwrap();

    assert_eq!(report.projects_queried, 2);
    assert!(cloud.calls().iter().all(|c| !c.path.contains("/projects/p-mos/")));
    assert!(report.bindings.project_roles.iter().all(|p| p.project != "MOS"));
}

#[tokio::test]
async fn test_audit_reserved_names_are_configurable() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    bind_everything(&cloud, &agency);

    let mut config = config(&cloud);
    config.audit.reserved_project_names.clear();
    let report = auditor(&config).audit(&agency).await.unwrap();

    assert_eq!(report.projects_queried, 3);
    assert!(report.bindings.project_roles.iter().any(|p| p.project == "MOS"));
}

#[tokio::test]
async fn test_audit_omits_a_failing_project() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    bind_everything(&cloud, &agency);
    cloud.fail_always("GET", "/projects/p-b/", 500);

    let report = auditor(&config(&cloud)).audit(&agency).await.unwrap();

    assert!(!report.is_complete());
    assert_eq!(report.omitted.len(), 1);
    assert_eq!(report.omitted[0].scope_kind, ScopeKind::Project);
    assert_eq!(report.omitted[0].scope, "proj-b");
    assert_eq!(
        report.bindings.project_roles,
        vec![ProjectRoles {
            project: "proj-a".to_string(),
            roles: roles(&["Admin"])
        }]
    );
    assert_eq!(report.bindings.domain_roles, roles(&["Viewer"]));
}

#[tokio::test]
async fn test_audit_fails_when_projects_cannot_be_listed() {
    let cloud = cloud().await;
    cloud.fail_always("GET", "/v3/projects", 500);

    let err = auditor(&config(&cloud))
        .audit(&unique_agency_id())
        .await
        .unwrap_err();

    assert!(err.to_string().contains("error listing"));
}

#[tokio::test]
async fn test_audit_without_bindings_is_empty() {
    let cloud = cloud().await;

    let report = auditor(&config(&cloud))
        .audit(&unique_agency_id())
        .await
        .unwrap();

    assert!(report.bindings.is_empty());
    assert!(report.is_complete());
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_audited_snapshot_reconciles_to_nothing() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    bind_everything(&cloud, &agency);

    let config = config(&cloud);
    let snapshot = auditor(&config).audit(&agency).await.unwrap().bindings;

    let iam = create_iam_client(&config).unwrap();
    let enterprise = create_enterprise_project_client(&config).unwrap();
    let service = ReconcileService::new(config, iam, enterprise)
        .with_locks(Arc::new(AccountLocks::new()));

    cloud.clear_calls();
    let report = service.reconcile(&agency, &snapshot, &snapshot).await.unwrap();
    assert!(report.plan.is_empty());
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_every_queried_scope_instance_passes_the_throttle() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    bind_everything(&cloud, &agency);
    cloud.fail_always("GET", "/projects/p-b/", 500);

    let config = config(&cloud);
    let throttle = Arc::new(CountingThrottle::default());
    let report = BindingAuditor::new(
        &config,
        create_iam_client(&config).unwrap(),
        create_enterprise_project_client(&config).unwrap()
    )
    .with_throttle(throttle.clone())
    .audit(&agency)
    .await
    .unwrap();

    assert_eq!(report.projects_queried, 2);
    assert_eq!(report.enterprise_projects_queried, 1);
    assert_eq!(
        throttle.acquired.load(Ordering::SeqCst),
        report.projects_queried + report.enterprise_projects_queried
    );
    assert!(
        cloud
            .calls()
            .iter()
            .all(|c| !c.path.contains("/projects/p-mos/"))
    );
}
