use agency_sync::lock::AccountLocks;
use agency_sync::scope::BindingAction;
use agency_sync::{
    AgencyBindings, AgencySyncConfig, AgencySyncError, EnterpriseProjectRoles, ProjectRoles,
    ReconcileService, ScopeKind, create_enterprise_project_client, create_iam_client,
};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use testing::{BindingFamily, FakeCloud, unique_agency_id};

const DOMAIN: &str = "domain-1";

async fn cloud() -> FakeCloud {
    let cloud = FakeCloud::start(DOMAIN).await;
    cloud.add_system_role("r-admin", "Admin");
    cloud.add_system_role("r-viewer", "Viewer");
    cloud.add_system_role("r-net", "NetworkAdmin");
    cloud.add_project("p-a", "proj-a");
    cloud.add_project("p-b", "proj-b");
    cloud.add_project("p-c", "proj-c");
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

fn service_with(config: AgencySyncConfig, locks: Arc<AccountLocks>) -> ReconcileService {
    let iam = create_iam_client(&config).unwrap();
    let enterprise = create_enterprise_project_client(&config).unwrap();
    ReconcileService::new(config, iam, enterprise).with_locks(locks)
}

fn service(cloud: &FakeCloud) -> ReconcileService {
    service_with(config(cloud), Arc::new(AccountLocks::new()))
}

fn roles(names: &[&str]) -> BTreeSet<String> {
    names.iter().map(ToString::to_string).collect()
}

fn project_bindings(entries: &[(&str, &[&str])]) -> AgencyBindings {
    AgencyBindings {
        project_roles: entries
            .iter()
            .map(|(project, names)| ProjectRoles {
                project: project.to_string(),
                roles: roles(names)
            })
            .collect(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_moving_a_role_between_projects_detaches_before_attaching() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    cloud.bind(BindingFamily::Project, "p-a", &agency, "r-admin");
    cloud.bind(BindingFamily::Project, "p-b", &agency, "r-viewer");

    let old = project_bindings(&[("proj-a", &["Admin"]), ("proj-b", &["Viewer"])]);
    let new = project_bindings(&[("proj-a", &["Admin"]), ("proj-c", &["Viewer"])]);

    let report = service(&cloud).reconcile(&agency, &old, &new).await.unwrap();

    let mutations = cloud.mutations();
    assert_eq!(mutations.len(), 2);
    assert_eq!(mutations[0].method, "DELETE");
    assert_eq!(
        mutations[0].path,
        format!("/v3.0/OS-AGENCY/projects/p-b/agencies/{}/roles/r-viewer", agency)
    );
    assert_eq!(mutations[1].method, "PUT");
    assert_eq!(
        mutations[1].path,
        format!("/v3.0/OS-AGENCY/projects/p-c/agencies/{}/roles/r-viewer", agency)
    );
    assert!(mutations.iter().all(|c| !c.path.contains("/projects/p-a/")));

    assert!(cloud.has_binding(BindingFamily::Project, "p-a", &agency, "r-admin"));
    assert!(!cloud.has_binding(BindingFamily::Project, "p-b", &agency, "r-viewer"));
    assert!(cloud.has_binding(BindingFamily::Project, "p-c", &agency, "r-viewer"));

    let counts = report.counts(ScopeKind::Project);
    assert_eq!(counts.detached, 1);
    assert_eq!(counts.attached, 1);
    assert!(report.completed_at.is_some());
}

#[tokio::test]
async fn test_all_resources_removal_touches_only_the_inherited_api() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    cloud.bind(BindingFamily::Inherited, DOMAIN, &agency, "r-net");

    let old = AgencyBindings {
        all_resources_roles: roles(&["NetworkAdmin"]),
        ..Default::default()
    };

    service(&cloud)
        .reconcile(&agency, &old, &AgencyBindings::default())
        .await
        .unwrap();

    let mutations = cloud.mutations();
    assert_eq!(mutations.len(), 1);
    assert_eq!(mutations[0].method, "DELETE");
    assert_eq!(
        mutations[0].path,
        format!(
            "/v3.0/OS-INHERIT/domains/{}/agencies/{}/roles/r-net/inherited_to_projects",
            DOMAIN, agency
        )
    );
    assert!(cloud.calls().iter().all(|c| c.path != "/v3/projects"));
    assert!(cloud.bindings().is_empty());
}

#[tokio::test]
async fn test_unchanged_declaration_makes_no_calls() {
    let cloud = cloud().await;
    let bindings = AgencyBindings {
        project_roles: vec![ProjectRoles {
            project: "proj-a".to_string(),
            roles: roles(&["Admin"])
        }],
        domain_roles: roles(&["Viewer"]),
        ..Default::default()
    };

    let report = service(&cloud)
        .reconcile(&unique_agency_id(), &bindings, &bindings)
        .await
        .unwrap();

    assert!(report.plan.is_empty());
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_detaching_an_absent_binding_succeeds() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    let old = AgencyBindings {
        domain_roles: roles(&["Viewer"]),
        ..Default::default()
    };

    let report = service(&cloud)
        .reconcile(&agency, &old, &AgencyBindings::default())
        .await
        .unwrap();

    let counts = report.counts(ScopeKind::Domain);
    assert_eq!(counts.already_absent, 1);
    assert_eq!(counts.detached, 0);
}

#[tokio::test]
async fn test_detached_binding_is_no_longer_listed() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    cloud.bind(BindingFamily::Project, "p-b", &agency, "r-viewer");

    let config = config(&cloud);
    let iam = create_iam_client(&config).unwrap();
    let old = project_bindings(&[("proj-b", &["Viewer"])]);
    service(&cloud)
        .reconcile(&agency, &old, &AgencyBindings::default())
        .await
        .unwrap();

    let listed = iam.list_project_roles(&agency, "p-b").await.unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn test_unknown_project_is_reported_by_name() {
    let cloud = cloud().await;
    let new = project_bindings(&[("proj-x", &["Admin"])]);

    let err = service(&cloud)
        .reconcile(&unique_agency_id(), &AgencyBindings::default(), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, AgencySyncError::ProjectNotFound(ref name) if name == "proj-x"));
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_attaching_an_unknown_role_fails() {
    let cloud = cloud().await;
    let new = AgencyBindings {
        domain_roles: roles(&["Ghost"]),
        ..Default::default()
    };

    let err = service(&cloud)
        .reconcile(&unique_agency_id(), &AgencyBindings::default(), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, AgencySyncError::RoleNotFound(ref name) if name == "Ghost"));
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_detaching_an_unknown_role_is_skipped() {
    let cloud = cloud().await;
    let old = AgencyBindings {
        domain_roles: roles(&["Ghost"]),
        ..Default::default()
    };

    let report = service(&cloud)
        .reconcile(&unique_agency_id(), &old, &AgencyBindings::default())
        .await
        .unwrap();

    assert_eq!(report.counts(ScopeKind::Domain).skipped, 1);
    assert!(cloud.mutations().is_empty());
}

#[tokio::test]
async fn test_custom_role_shadows_system_role() {
    let cloud = cloud().await;
    cloud.add_custom_role("r-custom-admin", "Admin");
    let agency = unique_agency_id();

    let new = AgencyBindings {
        domain_roles: roles(&["Admin"]),
        ..Default::default()
    };
    service(&cloud)
        .reconcile(&agency, &AgencyBindings::default(), &new)
        .await
        .unwrap();

    assert!(cloud.has_binding(BindingFamily::Domain, DOMAIN, &agency, "r-custom-admin"));
    assert!(!cloud.has_binding(BindingFamily::Domain, DOMAIN, &agency, "r-admin"));
}

#[tokio::test]
async fn test_enterprise_project_roles_use_bulk_assignment() {
    let cloud = cloud().await;
    cloud.add_enterprise_project("ep-1", "ep-prod");
    let agency = unique_agency_id();

    let new = AgencyBindings {
        enterprise_project_roles: vec![EnterpriseProjectRoles {
            enterprise_project: "ep-prod".to_string(),
            roles: roles(&["Viewer"])
        }],
        ..Default::default()
    };
    let report = service(&cloud)
        .reconcile(&agency, &AgencyBindings::default(), &new)
        .await
        .unwrap();

    assert_eq!(report.counts(ScopeKind::EnterpriseProject).attached, 1);
    assert!(cloud.has_binding(BindingFamily::EnterpriseProject, "ep-1", &agency, "r-viewer"));

    let mutations = cloud.mutations();
    assert_eq!(mutations.len(), 1);
    assert!(mutations[0].path.ends_with("/scopes/enterprise-project/role-assignments"));
}

#[tokio::test]
async fn test_enterprise_project_roles_need_the_endpoint() {
    let cloud = cloud().await;
    let config = AgencySyncConfig {
        enterprise_project_endpoint: None,
        ..config(&cloud)
    };

    let new = AgencyBindings {
        enterprise_project_roles: vec![EnterpriseProjectRoles {
            enterprise_project: "ep-prod".to_string(),
            roles: roles(&["Viewer"])
        }],
        ..Default::default()
    };
    let err = service_with(config, Arc::new(AccountLocks::new()))
        .reconcile(&unique_agency_id(), &AgencyBindings::default(), &new)
        .await
        .unwrap_err();

    assert!(matches!(err, AgencySyncError::ConfigError(_)));
}

#[tokio::test]
async fn test_failure_stops_without_rolling_back() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    cloud.bind(BindingFamily::Project, "p-b", &agency, "r-viewer");
    cloud.fail_always("PUT", "/projects/p-c/", 500);

    let old = project_bindings(&[("proj-b", &["Viewer"])]);
    let new = project_bindings(&[("proj-c", &["Viewer"])]);

    let err = service(&cloud)
        .reconcile(&agency, &old, &new)
        .await
        .unwrap_err();

    match &err {
        AgencySyncError::Binding {
            action,
            scope_kind,
            scope,
            role,
            ..
        } => {
            assert_eq!(*action, BindingAction::Attach);
            assert_eq!(*scope_kind, ScopeKind::Project);
            assert_eq!(scope, "proj-c");
            assert_eq!(role, "Viewer");
        }
        other => panic!("unexpected error: {other}")
    }
    assert!(err.is_retryable());
    assert!(!cloud.has_binding(BindingFamily::Project, "p-b", &agency, "r-viewer"));
}

#[tokio::test]
async fn test_listings_follow_pagination() {
    let cloud = cloud().await;
    cloud.add_project("p-d", "proj-d");
    cloud.add_project("p-e", "proj-e");
    cloud.add_system_role("r-last", "Auditor");
    let agency = unique_agency_id();

    let config = AgencySyncConfig {
        page_size: 2,
        ..config(&cloud)
    };
    let new = project_bindings(&[("proj-e", &["Auditor"])]);
    service_with(config, Arc::new(AccountLocks::new()))
        .reconcile(&agency, &AgencyBindings::default(), &new)
        .await
        .unwrap();

    assert!(cloud.has_binding(BindingFamily::Project, "p-e", &agency, "r-last"));
    let project_pages = cloud
        .calls()
        .iter()
        .filter(|c| c.path == "/v3/projects")
        .count();
    assert_eq!(project_pages, 3);
}

#[tokio::test]
async fn test_reconciliation_waits_for_the_account_lock() {
    let cloud = cloud().await;
    let agency = unique_agency_id();
    let locks = Arc::new(AccountLocks::new());
    let service = Arc::new(service_with(config(&cloud), locks.clone()));

    let new = AgencyBindings {
        domain_roles: roles(&["Viewer"]),
        ..Default::default()
    };

    let guard = locks.lock(DOMAIN).await;
    let task = {
        let service = service.clone();
        let agency = agency.clone();
        tokio::spawn(async move {
            service
                .reconcile(&agency, &AgencyBindings::default(), &new)
                .await
        })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!task.is_finished());
    assert!(cloud.mutations().is_empty());

    drop(guard);
    let report = task.await.unwrap().unwrap();
    assert_eq!(report.counts(ScopeKind::Domain).attached, 1);
}

#[tokio::test]
async fn test_dry_run_makes_no_calls() {
    let cloud = cloud().await;
    let old = project_bindings(&[("proj-a", &["Admin"])]);
    let new = project_bindings(&[("proj-b", &["Admin"])]);

    let report = service(&cloud).dry_run(&unique_agency_id(), &old, &new);

    assert!(report.dry_run);
    assert_eq!(report.plan.get(ScopeKind::Project).unwrap().remove.len(), 1);
    assert!(cloud.calls().is_empty());
}

#[tokio::test]
async fn test_roles_without_display_name_are_left_out_of_the_catalog() {
    let cloud = cloud().await;
    cloud.add_unnamed_system_role("r-hidden");
    let agency = unique_agency_id();

    let new = AgencyBindings {
        domain_roles: roles(&["Viewer"]),
        ..Default::default()
    };

    let report = service(&cloud)
        .reconcile(&agency, &AgencyBindings::default(), &new)
        .await
        .unwrap();

    assert_eq!(report.counts(ScopeKind::Domain).attached, 1);
    assert!(cloud.has_binding(BindingFamily::Domain, DOMAIN, &agency, "r-viewer"));
    assert!(cloud.mutations().iter().all(|c| !c.path.contains("r-hidden")));
    assert!(cloud.bindings().iter().all(|b| b.role_id != "r-hidden"));
}
