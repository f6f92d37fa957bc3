use crate::binding::{BindingDiff, BindingKey, diff_bindings};
use crate::catalog::RoleCatalog;
use crate::config::AgencySyncConfig;
use crate::declaration::AgencyBindings;
use crate::enterprise::EnterpriseProjectClient;
use crate::error::{AgencySyncError, AgencySyncResult};
use crate::iam::IamClient;
use crate::lock::AccountLocks;
use crate::resolver::ScopeResolver;
use crate::scope::{BindingAction, DetachOutcome, ScopeKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Per-kind add/remove sets computed from two declarations; no I/O involved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcilePlan {
    pub changes: BTreeMap<ScopeKind, BindingDiff>
}

impl ReconcilePlan {
    pub fn compute(old: &AgencyBindings, new: &AgencyBindings, domain_id: &str) -> Self {
        let changes = ScopeKind::ALL
            .iter()
            .map(|kind| {
                let diff = diff_bindings(old.pairs(*kind, domain_id), new.pairs(*kind, domain_id));
                (*kind, diff)
            })
            .filter(|(_, diff)| !diff.is_empty())
            .collect();

        Self { changes }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn get(&self, kind: ScopeKind) -> Option<&BindingDiff> {
        self.changes.get(&kind)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeCounts {
    pub attached: u32,
    pub detached: u32,
    pub already_absent: u32,
    pub skipped: u32
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub agency_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub plan: ReconcilePlan,
    pub scopes: BTreeMap<ScopeKind, ScopeCounts>
}

impl ReconcileReport {
    pub fn new(agency_id: &str, plan: ReconcilePlan) -> Self {
        Self {
            agency_id: agency_id.to_string(),
            started_at: Utc::now(),
            plan,
            ..Default::default()
        }
    }

    pub fn complete(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub fn counts(&self, kind: ScopeKind) -> ScopeCounts {
        self.scopes.get(&kind).copied().unwrap_or_default()
    }

    fn counts_mut(&mut self, kind: ScopeKind) -> &mut ScopeCounts {
        self.scopes.entry(kind).or_default()
    }

    pub fn total_calls(&self) -> u32 {
        self.scopes
            .values()
            .map(|c| c.attached + c.detached + c.already_absent)
            .sum()
    }
}

/// Converges an agency's remote role bindings from one declaration to another.
///
/// Per scope kind every removal is issued before any addition. The first
/// failure stops the run; nothing already applied is rolled back.
pub struct ReconcileService {
    config: AgencySyncConfig,
    iam: Arc<dyn IamClient>,
    enterprise: Option<Arc<dyn EnterpriseProjectClient>>,
    locks: Arc<AccountLocks>
}

impl ReconcileService {
    pub fn new(
        config: AgencySyncConfig,
        iam: Arc<dyn IamClient>,
        enterprise: Option<Arc<dyn EnterpriseProjectClient>>
    ) -> Self {
        Self {
            config,
            iam,
            enterprise,
            locks: AccountLocks::global()
        }
    }

    pub fn with_locks(mut self, locks: Arc<AccountLocks>) -> Self {
        self.locks = locks;
        self
    }

    pub fn config(&self) -> &AgencySyncConfig {
        &self.config
    }

    pub fn plan(&self, old: &AgencyBindings, new: &AgencyBindings) -> ReconcilePlan {
        ReconcilePlan::compute(old, new, &self.config.domain_id)
    }

    /// Computes the plan and reports it without touching the remote.
    pub fn dry_run(
        &self,
        agency_id: &str,
        old: &AgencyBindings,
        new: &AgencyBindings
    ) -> ReconcileReport {
        let mut report = ReconcileReport::new(agency_id, self.plan(old, new));
        report.dry_run = true;
        report.complete();
        report
    }

    pub async fn reconcile(
        &self,
        agency_id: &str,
        old: &AgencyBindings,
        new: &AgencyBindings
    ) -> AgencySyncResult<ReconcileReport> {
        let plan = self.plan(old, new);
        let mut report = ReconcileReport::new(agency_id, plan.clone());

        if plan.is_empty() {
            debug!(agency_id, "Role bindings unchanged");
            report.complete();
            return Ok(report);
        }

        let domain_id = self.config.domain_id.as_str();
        let _guard = if self.config.lock_reconciliation {
            Some(self.locks.lock(domain_id).await)
        } else {
            None
        };

        info!(agency_id, scope_kinds = plan.changes.len(), "Starting role reconciliation");
        let catalog = RoleCatalog::load(self.iam.as_ref(), domain_id).await?;
        let mut resolver =
            ScopeResolver::new(self.iam.as_ref(), self.enterprise.as_deref(), domain_id);

        for (kind, diff) in &plan.changes {
            self.apply_scope(agency_id, *kind, diff, &catalog, &mut resolver, &mut report)
                .await?;
        }

        report.complete();
        info!(
            agency_id,
            calls = report.total_calls(),
            "Role reconciliation completed"
        );
        Ok(report)
    }

    async fn apply_scope(
        &self,
        agency_id: &str,
        kind: ScopeKind,
        diff: &BindingDiff,
        catalog: &RoleCatalog,
        resolver: &mut ScopeResolver<'_>,
        report: &mut ReconcileReport
    ) -> AgencySyncResult<()> {
        debug!(
            scope_kind = %kind,
            remove = diff.remove.len(),
            add = diff.add.len(),
            "Reconciling scope kind"
        );

        for key in &diff.remove {
            let Some(role_id) = catalog.role_id(&key.role) else {
                warn!(scope_kind = %kind, role = %key.role, "Role to be detached does not exist, skipping");
                report.counts_mut(kind).skipped += 1;
                continue;
            };

            let target = resolver.resolve(kind, &key.scope).await?;
            let outcome = target
                .detach(self.iam.as_ref(), agency_id, role_id)
                .await
                .map_err(|e| binding_error(BindingAction::Detach, kind, key, agency_id, e))?;

            match outcome {
                DetachOutcome::Detached => report.counts_mut(kind).detached += 1,
                DetachOutcome::AlreadyAbsent => {
                    debug!(scope_kind = %kind, binding = %key, "Binding already absent");
                    report.counts_mut(kind).already_absent += 1;
                }
            }
        }

        for key in &diff.add {
            let role_id = catalog.require(&key.role)?;
            let target = resolver.resolve(kind, &key.scope).await?;
            target
                .attach(self.iam.as_ref(), agency_id, role_id)
                .await
                .map_err(|e| binding_error(BindingAction::Attach, kind, key, agency_id, e))?;
            report.counts_mut(kind).attached += 1;
        }

        Ok(())
    }
}

fn binding_error(
    action: BindingAction,
    scope_kind: ScopeKind,
    key: &BindingKey,
    agency_id: &str,
    source: AgencySyncError
) -> AgencySyncError {
    AgencySyncError::Binding {
        action,
        scope_kind,
        scope: key.scope.clone(),
        role: key.role.clone(),
        agency: agency_id.to_string(),
        source: Box::new(source)
    }
}
