/// Kommo REST API (v4) client.
///
/// Covers the contact, lead, and note endpoints the bridge needs. Every
/// non-2xx response is logged (body redacted) and returned as
/// `BridgeError::Http`, with 404 mapped to `BridgeError::NotFound`.
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, error};

use linebridge_core::{
    BridgeError, ContactPatch, CrmApi, CrmContact, CrmLead, LeadQuery, NewContact, NewLead,
    TokenProvider,
};
use linebridge_logging::truncate_for_log;

const SERVICE: &str = "kommo";

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct IdRef {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct TagRef {
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactEmbedded {
    #[serde(default)]
    tags: Vec<TagRef>,
    #[serde(default)]
    leads: Vec<IdRef>,
}

#[derive(Debug, Deserialize)]
struct ContactDto {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "_embedded", default)]
    embedded: Option<ContactEmbedded>,
}

#[derive(Debug, Default, Deserialize)]
struct LeadEmbedded {
    #[serde(default)]
    contacts: Vec<IdRef>,
}

#[derive(Debug, Deserialize)]
struct LeadDto {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    status_id: Option<u64>,
    #[serde(default)]
    pipeline_id: Option<u64>,
    #[serde(default)]
    created_at: Option<i64>,
    #[serde(rename = "_embedded", default)]
    embedded: Option<LeadEmbedded>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactsEmbedded {
    #[serde(default)]
    contacts: Vec<ContactDto>,
}

#[derive(Debug, Default, Deserialize)]
struct ContactsPage {
    #[serde(rename = "_embedded", default)]
    embedded: ContactsEmbedded,
}

#[derive(Debug, Default, Deserialize)]
struct LeadsEmbedded {
    #[serde(default)]
    leads: Vec<LeadDto>,
}

#[derive(Debug, Default, Deserialize)]
struct LeadsPage {
    #[serde(rename = "_embedded", default)]
    embedded: LeadsEmbedded,
}

impl From<ContactDto> for CrmContact {
    fn from(dto: ContactDto) -> Self {
        let embedded = dto.embedded.unwrap_or_default();
        CrmContact {
            id: dto.id,
            name: dto.name.unwrap_or_default(),
            tags: embedded.tags.into_iter().filter_map(|t| t.name).collect(),
            lead_ids: embedded.leads.into_iter().map(|l| l.id).collect(),
        }
    }
}

impl From<LeadDto> for CrmLead {
    fn from(dto: LeadDto) -> Self {
        CrmLead {
            id: dto.id,
            name: dto.name.unwrap_or_default(),
            status_id: dto.status_id,
            pipeline_id: dto.pipeline_id,
            contact_ids: dto
                .embedded
                .unwrap_or_default()
                .contacts
                .into_iter()
                .map(|c| c.id)
                .collect(),
            created_at: dto.created_at,
        }
    }
}

fn tag_list(tags: &[String]) -> Vec<Value> {
    tags.iter().map(|t| json!({ "name": t })).collect()
}

fn decode<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, BridgeError> {
    serde_json::from_value(value).map_err(|e| BridgeError::Decode {
        service: SERVICE,
        message: e.to_string(),
    })
}

/// Newest first by `created_at`, then by id for leads without a timestamp.
fn sort_newest_first(leads: &mut [CrmLead]) {
    leads.sort_by(|a, b| {
        b.created_at
            .unwrap_or(0)
            .cmp(&a.created_at.unwrap_or(0))
            .then(b.id.cmp(&a.id))
    });
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KommoClient {
    http: Client,
    base_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl KommoClient {
    /// `base_url` is the account URL, e.g. `https://acme.kommo.com`.
    pub fn new(http: Client, base_url: impl Into<String>, tokens: Arc<dyn TokenProvider>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        }
    }

    /// Send a request; `Ok(None)` for 204 No Content.
    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<Value>,
    ) -> Result<Option<Value>, BridgeError> {
        let token = self.tokens.get_valid_token().await?;
        let url = format!("{}/api/v4{}", self.base_url, path);

        let mut req = self.http.request(method.clone(), &url).bearer_auth(token);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(body) = &body {
            req = req.json(body);
        }

        debug!(%method, path, "[Kommo] Sending request");
        let res = req.send().await.map_err(|e| {
            error!(%method, path, "[Kommo] Request failed: {}", e);
            BridgeError::Transport {
                service: SERVICE,
                message: e.to_string(),
            }
        })?;

        let status = res.status();
        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            let body = truncate_for_log(&res.text().await.unwrap_or_default());
            error!(%method, path, status = status.as_u16(), body = %body, "[Kommo] Request rejected");
            if status == StatusCode::NOT_FOUND {
                return Err(BridgeError::NotFound(format!("{method} {path}")));
            }
            return Err(BridgeError::Http {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }

        let text = res.text().await.map_err(|e| BridgeError::Transport {
            service: SERVICE,
            message: e.to_string(),
        })?;
        if text.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| BridgeError::Decode {
                service: SERVICE,
                message: e.to_string(),
            })
    }

    /// First entity id from a batch-create response (`_embedded.<kind>[0].id`).
    fn created_id(value: Option<Value>, kind: &str) -> Result<u64, BridgeError> {
        value
            .as_ref()
            .and_then(|v| v.get("_embedded"))
            .and_then(|e| e.get(kind))
            .and_then(|list| list.get(0))
            .and_then(|item| item.get("id"))
            .and_then(Value::as_u64)
            .ok_or_else(|| BridgeError::Decode {
                service: SERVICE,
                message: format!("create response has no {kind} id"),
            })
    }

    async fn leads_by_ids(&self, ids: &[u64], query: LeadQuery) -> Result<Vec<CrmLead>, BridgeError> {
        let mut params: Vec<(String, String)> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| (format!("filter[id][{i}]"), id.to_string()))
            .collect();
        params.push(("with".into(), "contacts".into()));
        params.push(("limit".into(), query.limit.to_string()));
        if query.newest_first {
            params.push(("order[created_at]".into(), "desc".into()));
        }

        let page: LeadsPage = match self.request(Method::GET, "/leads", &params, None).await? {
            Some(v) => decode(v)?,
            None => LeadsPage::default(),
        };
        let mut leads: Vec<CrmLead> = page.embedded.leads.into_iter().map(CrmLead::from).collect();
        // Leads fetched with embedded contacts must actually link to the contact.
        leads.retain(|l| l.contact_ids.is_empty() || l.contact_ids.contains(&query.contact_id));
        if query.newest_first {
            sort_newest_first(&mut leads);
        }
        leads.truncate(query.limit as usize);
        Ok(leads)
    }
}

#[async_trait]
impl CrmApi for KommoClient {
    async fn list_contacts(&self, query: &str, limit: u32) -> Result<Vec<CrmContact>, BridgeError> {
        let params = vec![
            ("query".to_string(), query.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        let page: ContactsPage = match self.request(Method::GET, "/contacts", &params, None).await? {
            Some(v) => decode(v)?,
            None => ContactsPage::default(),
        };
        Ok(page.embedded.contacts.into_iter().map(CrmContact::from).collect())
    }

    async fn create_contact(&self, contact: NewContact) -> Result<CrmContact, BridgeError> {
        let body = json!([{
            "name": contact.name,
            "_embedded": { "tags": tag_list(&contact.tags) },
        }]);
        let created = self.request(Method::POST, "/contacts", &[], Some(body)).await?;
        let id = Self::created_id(created, "contacts")?;
        Ok(CrmContact {
            id,
            name: contact.name,
            tags: contact.tags,
            lead_ids: Vec::new(),
        })
    }

    async fn patch_contact(&self, id: u64, patch: ContactPatch) -> Result<CrmContact, BridgeError> {
        let mut body = serde_json::Map::new();
        if let Some(name) = &patch.name {
            body.insert("name".into(), json!(name));
        }
        if !patch.tags_to_add.is_empty() {
            body.insert("tags_to_add".into(), json!(tag_list(&patch.tags_to_add)));
        }
        let path = format!("/contacts/{id}");
        let updated = self
            .request(Method::PATCH, &path, &[], Some(Value::Object(body)))
            .await?;

        // The PATCH response only echoes scalar fields.
        let mut contact = match updated {
            Some(v) => CrmContact::from(decode::<ContactDto>(v)?),
            None => CrmContact {
                id,
                ..Default::default()
            },
        };
        if let Some(name) = patch.name {
            contact.name = name;
        }
        contact.tags.extend(patch.tags_to_add);
        Ok(contact)
    }

    async fn list_leads(&self, query: LeadQuery) -> Result<Vec<CrmLead>, BridgeError> {
        // Kommo cannot filter leads by contact; read the contact's links first.
        let path = format!("/contacts/{}", query.contact_id);
        let params = vec![("with".to_string(), "leads".to_string())];
        let contact: CrmContact = match self.request(Method::GET, &path, &params, None).await? {
            Some(v) => decode::<ContactDto>(v)?.into(),
            None => return Ok(Vec::new()),
        };
        if contact.lead_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.leads_by_ids(&contact.lead_ids, query).await
    }

    async fn create_lead(&self, lead: NewLead) -> Result<CrmLead, BridgeError> {
        let mut item = json!({
            "name": lead.name,
            "_embedded": {
                "contacts": [{ "id": lead.contact_id }],
                "tags": tag_list(&lead.tags),
            },
        });
        if let Some(pipeline_id) = lead.pipeline_id {
            item["pipeline_id"] = json!(pipeline_id);
        }
        let created = self
            .request(Method::POST, "/leads", &[], Some(Value::Array(vec![item])))
            .await?;
        let id = Self::created_id(created, "leads")?;
        Ok(CrmLead {
            id,
            name: lead.name,
            status_id: None,
            pipeline_id: lead.pipeline_id,
            contact_ids: vec![lead.contact_id],
            created_at: None,
        })
    }

    async fn create_note(&self, lead_id: u64, text: &str) -> Result<(), BridgeError> {
        let body = json!([{
            "entity_id": lead_id,
            "note_type": "common",
            "params": { "text": text },
        }]);
        self.request(Method::POST, "/leads/notes", &[], Some(body)).await?;
        Ok(())
    }

    async fn get_contact(&self, id: u64) -> Result<CrmContact, BridgeError> {
        let path = format!("/contacts/{id}");
        match self.request(Method::GET, &path, &[], None).await? {
            Some(v) => Ok(decode::<ContactDto>(v)?.into()),
            None => Err(BridgeError::NotFound(format!("contact {id}"))),
        }
    }

    async fn get_lead(&self, id: u64, with_contacts: bool) -> Result<CrmLead, BridgeError> {
        let path = format!("/leads/{id}");
        let params = if with_contacts {
            vec![("with".to_string(), "contacts".to_string())]
        } else {
            Vec::new()
        };
        match self.request(Method::GET, &path, &params, None).await? {
            Some(v) => Ok(decode::<LeadDto>(v)?.into()),
            None => Err(BridgeError::NotFound(format!("lead {id}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::{
        extract::Query,
        http::HeaderMap,
        routing::{get, patch, post},
        Json, Router,
    };

    use super::*;
    use crate::token::StaticTokenProvider;

    type Params = Vec<(String, String)>;

    /// Serve `router` on an ephemeral local port and return its base URL.
    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn client(base_url: &str) -> KommoClient {
        KommoClient::new(Client::new(), base_url, Arc::new(StaticTokenProvider::new("tok")))
    }

    fn has(params: &Params, key: &str, value: &str) -> bool {
        params.iter().any(|(k, v)| k == key && v == value)
    }

    #[test]
    fn contact_dto_maps_tags_and_leads() {
        let dto: ContactDto = serde_json::from_value(json!({
            "id": 55,
            "name": "Alice (U123)",
            "_embedded": {
                "tags": [{"id": 1, "name": "LINE"}, {"id": 2, "name": "LINE_UID_U123"}],
                "leads": [{"id": 900}, {"id": 901}]
            }
        }))
        .unwrap();
        let contact = CrmContact::from(dto);
        assert_eq!(contact.id, 55);
        assert_eq!(contact.tags, vec!["LINE", "LINE_UID_U123"]);
        assert_eq!(contact.lead_ids, vec![900, 901]);
    }

    #[test]
    fn contact_dto_tolerates_nulls() {
        let dto: ContactDto = serde_json::from_value(json!({"id": 7, "name": null})).unwrap();
        let contact = CrmContact::from(dto);
        assert_eq!(contact.name, "");
        assert!(contact.tags.is_empty());
    }

    #[test]
    fn lead_dto_maps_contacts() {
        let dto: LeadDto = serde_json::from_value(json!({
            "id": 999,
            "name": "Hello",
            "status_id": 142,
            "pipeline_id": 3,
            "created_at": 1700000000,
            "_embedded": {"contacts": [{"id": 55, "is_main": true}]}
        }))
        .unwrap();
        let lead = CrmLead::from(dto);
        assert_eq!(lead.contact_ids, vec![55]);
        assert!(!lead.is_open());
    }

    #[test]
    fn created_id_reads_batch_response() {
        let body = json!({"_embedded": {"contacts": [{"id": 123, "request_id": "0"}]}});
        assert_eq!(KommoClient::created_id(Some(body), "contacts").unwrap(), 123);
        assert!(KommoClient::created_id(None, "contacts").is_err());
        assert!(KommoClient::created_id(Some(json!({})), "leads").is_err());
    }

    #[test]
    fn sorts_newest_first() {
        let mut leads = vec![
            CrmLead { id: 1, created_at: Some(10), ..Default::default() },
            CrmLead { id: 2, created_at: Some(30), ..Default::default() },
            CrmLead { id: 3, created_at: None, ..Default::default() },
        ];
        sort_newest_first(&mut leads);
        let ids: Vec<u64> = leads.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![2, 1, 3]);
    }

    #[test]
    fn tag_list_shape() {
        assert_eq!(
            Value::Array(tag_list(&["LINE".to_string()])),
            json!([{"name": "LINE"}])
        );
    }

    #[tokio::test]
    async fn list_leads_reads_contact_links_then_filters_leads() {
        let contact_calls: Arc<Mutex<Vec<(String, Params)>>> = Arc::default();
        let lead_calls: Arc<Mutex<Vec<Params>>> = Arc::default();
        let contact_seen = contact_calls.clone();
        let lead_seen = lead_calls.clone();

        let router = Router::new()
            .route(
                "/api/v4/contacts/55",
                get(move |headers: HeaderMap, Query(params): Query<Params>| {
                    let seen = contact_seen.clone();
                    async move {
                        let auth = headers
                            .get("authorization")
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        seen.lock().unwrap().push((auth, params));
                        Json(json!({"id": 55, "_embedded": {"leads": [{"id": 900}, {"id": 901}]}}))
                    }
                }),
            )
            .route(
                "/api/v4/leads",
                get(move |Query(params): Query<Params>| {
                    let seen = lead_seen.clone();
                    async move {
                        seen.lock().unwrap().push(params);
                        Json(json!({"_embedded": {"leads": [
                            {"id": 900, "created_at": 10, "_embedded": {"contacts": [{"id": 55}]}},
                            {"id": 901, "created_at": 20, "_embedded": {"contacts": [{"id": 55}]}},
                            {"id": 902, "created_at": 30, "_embedded": {"contacts": [{"id": 77}]}}
                        ]}}))
                    }
                }),
            );
        let base = serve(router).await;

        let leads = client(&base)
            .list_leads(LeadQuery {
                contact_id: 55,
                limit: 50,
                newest_first: true,
            })
            .await
            .unwrap();

        let ids: Vec<u64> = leads.iter().map(|l| l.id).collect();
        assert_eq!(ids, vec![901, 900]);

        let contact_calls = contact_calls.lock().unwrap();
        assert_eq!(contact_calls.len(), 1);
        assert_eq!(contact_calls[0].0, "Bearer tok");
        assert!(has(&contact_calls[0].1, "with", "leads"));

        let lead_calls = lead_calls.lock().unwrap();
        assert_eq!(lead_calls.len(), 1);
        let params = &lead_calls[0];
        assert!(has(params, "filter[id][0]", "900"));
        assert!(has(params, "filter[id][1]", "901"));
        assert!(has(params, "with", "contacts"));
        assert!(has(params, "limit", "50"));
        assert!(has(params, "order[created_at]", "desc"));
    }

    #[tokio::test]
    async fn no_content_means_nothing_found() {
        let router = Router::new()
            .route("/api/v4/contacts", get(|| async { StatusCode::NO_CONTENT }))
            .route("/api/v4/contacts/55", get(|| async { StatusCode::NO_CONTENT }));
        let kommo = client(&serve(router).await);

        assert!(kommo.list_contacts("U1", 25).await.unwrap().is_empty());
        let leads = kommo
            .list_leads(LeadQuery {
                contact_id: 55,
                limit: 50,
                newest_first: true,
            })
            .await
            .unwrap();
        assert!(leads.is_empty());
    }

    #[tokio::test]
    async fn error_statuses_map_to_bridge_errors() {
        let router = Router::new()
            .route("/api/v4/contacts/1", get(|| async { (StatusCode::NOT_FOUND, "missing") }))
            .route(
                "/api/v4/leads/2",
                get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
            );
        let kommo = client(&serve(router).await);

        let err = kommo.get_contact(1).await.unwrap_err();
        assert!(matches!(err, BridgeError::NotFound(_)));

        match kommo.get_lead(2, true).await.unwrap_err() {
            BridgeError::Http { service, status, body } => {
                assert_eq!(service, "kommo");
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn patch_sends_tags_to_add() {
        let seen: Arc<Mutex<Option<Value>>> = Arc::default();
        let body_seen = seen.clone();
        let router = Router::new().route(
            "/api/v4/contacts/55",
            patch(move |Json(body): Json<Value>| {
                let seen = body_seen.clone();
                async move {
                    *seen.lock().unwrap() = Some(body);
                    Json(json!({"id": 55, "name": "Alice"}))
                }
            }),
        );
        let kommo = client(&serve(router).await);

        let contact = kommo
            .patch_contact(
                55,
                ContactPatch {
                    name: None,
                    tags_to_add: vec!["LINE_UID_U1".into()],
                },
            )
            .await
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(json!({"tags_to_add": [{"name": "LINE_UID_U1"}]}))
        );
        assert_eq!(contact.name, "Alice");
        assert_eq!(contact.tags, vec!["LINE_UID_U1"]);
    }

    #[tokio::test]
    async fn create_contact_and_note_bodies() {
        let bodies: Arc<Mutex<Vec<Value>>> = Arc::default();
        let contact_seen = bodies.clone();
        let note_seen = bodies.clone();
        let router = Router::new()
            .route(
                "/api/v4/contacts",
                post(move |Json(body): Json<Value>| {
                    let seen = contact_seen.clone();
                    async move {
                        seen.lock().unwrap().push(body);
                        Json(json!({"_embedded": {"contacts": [{"id": 321, "request_id": "0"}]}}))
                    }
                }),
            )
            .route(
                "/api/v4/leads/notes",
                post(move |Json(body): Json<Value>| {
                    let seen = note_seen.clone();
                    async move {
                        seen.lock().unwrap().push(body);
                        Json(json!({"_embedded": {"notes": [{"id": 1}]}}))
                    }
                }),
            );
        let kommo = client(&serve(router).await);

        let contact = kommo
            .create_contact(NewContact {
                name: "Alice (U1)".into(),
                tags: vec!["LINE".into(), "LINE_UID_U1".into()],
            })
            .await
            .unwrap();
        assert_eq!(contact.id, 321);
        kommo.create_note(900, "[LINE] hi").await.unwrap();

        let bodies = bodies.lock().unwrap();
        assert_eq!(
            bodies[0],
            json!([{
                "name": "Alice (U1)",
                "_embedded": {"tags": [{"name": "LINE"}, {"name": "LINE_UID_U1"}]}
            }])
        );
        assert_eq!(
            bodies[1],
            json!([{"entity_id": 900, "note_type": "common", "params": {"text": "[LINE] hi"}}])
        );
    }
}
