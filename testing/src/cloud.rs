use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use wiremock::matchers::any;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const DEFAULT_PAGE_SIZE: usize = 100;

/// Which API family a binding was made through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BindingFamily {
    Project,
    Domain,
    Inherited,
    EnterpriseProject
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FakeBinding {
    pub family: BindingFamily,
    pub scope_id: String,
    pub agency_id: String,
    pub role_id: String
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub method: String,
    pub path: String
}

impl RecordedCall {
    pub fn is_mutation(&self) -> bool {
        matches!(self.method.as_str(), "PUT" | "POST" | "DELETE" | "PATCH")
    }
}

#[derive(Debug, Clone)]
struct FakeRole {
    id: String,
    name: String,
    display_name: Option<String>
}

impl FakeRole {
    fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "name": self.name,
            "display_name": self.display_name
        })
    }
}

#[derive(Debug, Clone)]
struct InjectedFailure {
    method: String,
    path_fragment: String,
    status: u16,
    remaining: Option<u32>
}

#[derive(Default)]
struct CloudState {
    domain_id: String,
    system_roles: Vec<FakeRole>,
    custom_roles: Vec<FakeRole>,
    projects: Vec<(String, String)>,
    enterprise_projects: Vec<(String, String)>,
    bindings: BTreeSet<FakeBinding>,
    agencies: BTreeMap<String, Value>,
    next_agency: u32,
    calls: Vec<RecordedCall>,
    failures: Vec<InjectedFailure>
}

/// In-memory IAM and enterprise-project API behind a wiremock server.
pub struct FakeCloud {
    server: MockServer,
    state: Arc<Mutex<CloudState>>
}

impl FakeCloud {
    pub async fn start(domain_id: &str) -> Self {
        let state = Arc::new(Mutex::new(CloudState {
            domain_id: domain_id.to_string(),
            ..Default::default()
        }));

        let server = MockServer::start().await;
        Mock::given(any())
            .respond_with(CloudResponder {
                state: state.clone()
            })
            .mount(&server)
            .await;

        tracing::debug!("Fake cloud started at {}", server.uri());
        Self { server, state }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub fn domain_id(&self) -> String {
        self.state.lock().domain_id.clone()
    }

    pub fn add_system_role(&self, id: &str, display_name: &str) {
        self.state.lock().system_roles.push(FakeRole {
            id: id.to_string(),
            name: format!("system_{}", id),
            display_name: Some(display_name.to_string())
        });
    }

    /// A role the catalog has to skip: listed, but without a display name.
    pub fn add_unnamed_system_role(&self, id: &str) {
        self.state.lock().system_roles.push(FakeRole {
            id: id.to_string(),
            name: format!("system_{}", id),
            display_name: None
        });
    }

    pub fn add_custom_role(&self, id: &str, display_name: &str) {
        self.state.lock().custom_roles.push(FakeRole {
            id: id.to_string(),
            name: format!("custom_{}", id),
            display_name: Some(display_name.to_string())
        });
    }

    pub fn add_project(&self, id: &str, name: &str) {
        self.state
            .lock()
            .projects
            .push((id.to_string(), name.to_string()));
    }

    pub fn add_enterprise_project(&self, id: &str, name: &str) {
        self.state
            .lock()
            .enterprise_projects
            .push((id.to_string(), name.to_string()));
    }

    pub fn add_agency(&self, id: &str, name: &str, trust_domain_name: &str, duration: Value) {
        let domain_id = self.domain_id();
        self.state.lock().agencies.insert(
            id.to_string(),
            json!({
                "id": id,
                "name": name,
                "domain_id": domain_id,
                "trust_domain_name": trust_domain_name,
                "duration": duration
            })
        );
    }

    pub fn agency(&self, id: &str) -> Option<Value> {
        self.state.lock().agencies.get(id).cloned()
    }

    pub fn bind(&self, family: BindingFamily, scope_id: &str, agency_id: &str, role_id: &str) {
        self.state.lock().bindings.insert(FakeBinding {
            family,
            scope_id: scope_id.to_string(),
            agency_id: agency_id.to_string(),
            role_id: role_id.to_string()
        });
    }

    pub fn has_binding(
        &self,
        family: BindingFamily,
        scope_id: &str,
        agency_id: &str,
        role_id: &str
    ) -> bool {
        self.state.lock().bindings.contains(&FakeBinding {
            family,
            scope_id: scope_id.to_string(),
            agency_id: agency_id.to_string(),
            role_id: role_id.to_string()
        })
    }

    pub fn bindings(&self) -> Vec<FakeBinding> {
        self.state.lock().bindings.iter().cloned().collect()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(RecordedCall::is_mutation)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    /// Answers the next `times` matching requests with `status`.
    pub fn fail(&self, method: &str, path_fragment: &str, status: u16, times: u32) {
        self.state.lock().failures.push(InjectedFailure {
            method: method.to_string(),
            path_fragment: path_fragment.to_string(),
            status,
            remaining: Some(times)
        });
    }

    pub fn fail_always(&self, method: &str, path_fragment: &str, status: u16) {
        self.state.lock().failures.push(InjectedFailure {
            method: method.to_string(),
            path_fragment: path_fragment.to_string(),
            status,
            remaining: None
        });
    }
}

struct CloudResponder {
    state: Arc<Mutex<CloudState>>
}

impl Respond for CloudResponder {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let method = request.method.as_str().to_string();
        let path = request.url.path().to_string();
        let query: HashMap<String, String> = request.url.query_pairs().into_owned().collect();

        let mut state = self.state.lock();
        state.calls.push(RecordedCall {
            method: method.clone(),
            path: path.clone()
        });

        if !request.headers.contains_key("X-Auth-Token") {
            return ResponseTemplate::new(401);
        }
        if let Some(status) = state.take_failure(&method, &path) {
            let template = ResponseTemplate::new(status).set_body_string("injected failure");
            return if status == 429 {
                template.insert_header("Retry-After", "0")
            } else {
                template
            };
        }

        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        match (method.as_str(), segments.as_slice()) {
            ("GET", ["v3", "roles"]) => state.list_roles(&query),
            ("GET", ["v3", "projects"]) => state.list_projects(&query),
            ("GET", ["v1.0", "enterprise-projects"]) => state.list_enterprise_projects(&query),

            ("GET", ["v3.0", "OS-AGENCY", "projects", pid, "agencies", aid, "roles"]) => {
                state.list_bound(BindingFamily::Project, pid, aid)
            }
            (_, ["v3.0", "OS-AGENCY", "projects", pid, "agencies", aid, "roles", rid]) => {
                if !state.projects.iter().any(|(id, _)| id == pid) {
                    return ResponseTemplate::new(404);
                }
                ResponseTemplate::new(state.mutate(&method, BindingFamily::Project, pid, aid, rid))
            }

            ("GET", ["v3.0", "OS-AGENCY", "domains", did, "agencies", aid, "roles"]) => {
                state.list_bound(BindingFamily::Domain, did, aid)
            }
            (_, ["v3.0", "OS-AGENCY", "domains", did, "agencies", aid, "roles", rid]) => {
                ResponseTemplate::new(state.mutate(&method, BindingFamily::Domain, did, aid, rid))
            }

            (
                "GET",
                ["v3.0", "OS-INHERIT", "domains", did, "agencies", aid, "roles", "inherited_to_projects"]
            ) => state.list_bound(BindingFamily::Inherited, did, aid),
            (
                _,
                ["v3.0", "OS-INHERIT", "domains", did, "agencies", aid, "roles", rid, "inherited_to_projects"]
            ) => ResponseTemplate::new(state.mutate(&method, BindingFamily::Inherited, did, aid, rid)),

            (
                _,
                ["v3.0", "OS-PERMISSION", "subjects", "agency", "scopes", "enterprise-project", "role-assignments"]
            ) => match request.body_json::<Value>() {
                Ok(body) => state.mutate_assignments(&method, &body),
                Err(_) => ResponseTemplate::new(400)
            },
            ("GET", ["v3.0", "OS-PERMISSION", "enterprise-projects", ep, "agencies", aid, "roles"]) => {
                state.list_bound(BindingFamily::EnterpriseProject, ep, aid)
            }

            ("POST", ["v3.0", "OS-AGENCY", "agencies"]) => match request.body_json::<Value>() {
                Ok(body) => state.create_agency(&body),
                Err(_) => ResponseTemplate::new(400)
            },
            ("GET", ["v3.0", "OS-AGENCY", "agencies", id]) => match state.agencies.get(*id) {
                Some(agency) => ResponseTemplate::new(200).set_body_json(json!({ "agency": agency })),
                None => ResponseTemplate::new(404)
            },
            ("PUT", ["v3.0", "OS-AGENCY", "agencies", id]) => match request.body_json::<Value>() {
                Ok(body) => state.update_agency(id, &body),
                Err(_) => ResponseTemplate::new(400)
            },
            ("DELETE", ["v3.0", "OS-AGENCY", "agencies", id]) => match state.agencies.remove(*id) {
                Some(_) => ResponseTemplate::new(204),
                None => ResponseTemplate::new(404)
            },

            _ => ResponseTemplate::new(404)
        }
    }
}

impl CloudState {
    fn take_failure(&mut self, method: &str, path: &str) -> Option<u16> {
        let index = self
            .failures
            .iter()
            .position(|f| f.method == method && path.contains(&f.path_fragment))?;

        let failure = &mut self.failures[index];
        let status = failure.status;
        if let Some(remaining) = failure.remaining.as_mut() {
            *remaining -= 1;
            if *remaining == 0 {
                self.failures.remove(index);
            }
        }
        Some(status)
    }

    fn role(&self, id: &str) -> Option<&FakeRole> {
        self.custom_roles
            .iter()
            .chain(self.system_roles.iter())
            .find(|r| r.id == id)
    }

    fn list_roles(&self, query: &HashMap<String, String>) -> ResponseTemplate {
        let roles = match query.get("domain_id") {
            Some(domain_id) if *domain_id == self.domain_id => &self.custom_roles,
            Some(_) => return ResponseTemplate::new(200).set_body_json(json!({ "roles": [] })),
            None => &self.system_roles
        };

        let page: Vec<Value> = paginate(roles, query).iter().map(FakeRole::to_json).collect();
        ResponseTemplate::new(200).set_body_json(json!({ "roles": page }))
    }

    fn list_projects(&self, query: &HashMap<String, String>) -> ResponseTemplate {
        let page: Vec<Value> = paginate(&self.projects, query)
            .iter()
            .map(|(id, name)| json!({ "id": id, "name": name, "domain_id": self.domain_id }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "projects": page }))
    }

    fn list_enterprise_projects(&self, query: &HashMap<String, String>) -> ResponseTemplate {
        let limit = query
            .get("limit")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = query
            .get("offset")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);

        let page: Vec<Value> = self
            .enterprise_projects
            .iter()
            .skip(offset)
            .take(limit)
            .map(|(id, name)| json!({ "id": id, "name": name, "status": 1 }))
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({
            "enterprise_projects": page,
            "total_count": self.enterprise_projects.len()
        }))
    }

    fn list_bound(&self, family: BindingFamily, scope_id: &str, agency_id: &str) -> ResponseTemplate {
        let roles: Vec<Value> = self
            .bindings
            .iter()
            .filter(|b| b.family == family && b.scope_id == scope_id && b.agency_id == agency_id)
            .filter_map(|b| self.role(&b.role_id))
            .map(FakeRole::to_json)
            .collect();
        ResponseTemplate::new(200).set_body_json(json!({ "roles": roles }))
    }

    /// Returns the status the remote answers a single binding call with.
    fn mutate(
        &mut self,
        method: &str,
        family: BindingFamily,
        scope_id: &str,
        agency_id: &str,
        role_id: &str
    ) -> u16 {
        if self.role(role_id).is_none() {
            return 404;
        }

        let binding = FakeBinding {
            family,
            scope_id: scope_id.to_string(),
            agency_id: agency_id.to_string(),
            role_id: role_id.to_string()
        };
        match method {
            "PUT" => {
                self.bindings.insert(binding);
                204
            }
            "DELETE" if self.bindings.remove(&binding) => 204,
            "DELETE" => 404,
            _ => 405
        }
    }

    fn mutate_assignments(&mut self, method: &str, body: &Value) -> ResponseTemplate {
        let Some(assignments) = body.get("role_assignments").and_then(Value::as_array) else {
            return ResponseTemplate::new(400);
        };

        for assignment in assignments {
            let field = |name: &str| {
                assignment
                    .get(name)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            let ep = field("enterprise_project_id");
            if !self.enterprise_projects.iter().any(|(id, _)| *id == ep) {
                return ResponseTemplate::new(404);
            }

            let status = self.mutate(
                method,
                BindingFamily::EnterpriseProject,
                &ep,
                &field("agency_id"),
                &field("role_id")
            );
            if status >= 400 {
                return ResponseTemplate::new(status);
            }
        }
        ResponseTemplate::new(204)
    }

    fn create_agency(&mut self, body: &Value) -> ResponseTemplate {
        let Some(request) = body.get("agency") else {
            return ResponseTemplate::new(400);
        };

        self.next_agency += 1;
        let id = format!("agency-{}", self.next_agency);
        let agency = json!({
            "id": id,
            "name": request.get("name").cloned().unwrap_or(Value::Null),
            "domain_id": request.get("domain_id").cloned().unwrap_or(Value::Null),
            "trust_domain_name": request.get("trust_domain_name").cloned().unwrap_or(Value::Null),
            "description": request.get("description").cloned().unwrap_or(Value::Null),
            "duration": reported_duration(request.get("duration"))
        });
        self.agencies.insert(id, agency.clone());
        ResponseTemplate::new(201).set_body_json(json!({ "agency": agency }))
    }

    fn update_agency(&mut self, id: &str, body: &Value) -> ResponseTemplate {
        let Some(agency) = self.agencies.get_mut(id) else {
            return ResponseTemplate::new(404);
        };
        let Some(request) = body.get("agency").and_then(Value::as_object) else {
            return ResponseTemplate::new(400);
        };

        for (key, value) in request {
            let value = if key == "duration" {
                reported_duration(Some(value))
            } else {
                value.clone()
            };
            agency[key] = value;
        }
        ResponseTemplate::new(200).set_body_json(json!({ "agency": agency }))
    }
}

/// The API accepts days (or `"ONEDAY"`) and reports hours.
fn reported_duration(declared: Option<&Value>) -> Value {
    match declared {
        Some(Value::Number(n)) => n.as_i64().map_or(Value::Null, |days| json!((days * 24).to_string())),
        Some(Value::String(s)) if s == "ONEDAY" => json!("24"),
        Some(other) => other.clone(),
        None => json!("FOREVER")
    }
}

fn paginate<'a, T>(items: &'a [T], query: &HashMap<String, String>) -> &'a [T] {
    let per_page = query
        .get("per_page")
        .and_then(|v| v.parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let page = query
        .get("page")
        .and_then(|v| v.parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or(1);

    let start = ((page - 1) * per_page).min(items.len());
    let end = (start + per_page).min(items.len());
    &items[start..end]
}
