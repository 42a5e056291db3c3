use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use linebridge_core::{
    BridgeError, ContactPatch, CrmApi, CrmContact, CrmLead, LeadQuery, NewContact, NewLead,
};

/// One recorded call against [`MockCrm`].
#[derive(Debug, Clone, PartialEq)]
pub enum CrmCall {
    ListContacts { query: String },
    CreateContact(NewContact),
    PatchContact { id: u64, patch: ContactPatch },
    ListLeads(LeadQuery),
    CreateLead(NewLead),
    CreateNote { lead_id: u64, text: String },
    GetContact(u64),
    GetLead(u64),
}

impl CrmCall {
    fn op(&self) -> &'static str {
        match self {
            CrmCall::ListContacts { .. } => "list_contacts",
            CrmCall::CreateContact(_) => "create_contact",
            CrmCall::PatchContact { .. } => "patch_contact",
            CrmCall::ListLeads(_) => "list_leads",
            CrmCall::CreateLead(_) => "create_lead",
            CrmCall::CreateNote { .. } => "create_note",
            CrmCall::GetContact(_) => "get_contact",
            CrmCall::GetLead(_) => "get_lead",
        }
    }
}

#[derive(Default)]
struct State {
    contacts: Vec<CrmContact>,
    leads: Vec<CrmLead>,
    notes: Vec<(u64, String)>,
    calls: Vec<CrmCall>,
    failing: HashSet<&'static str>,
    next_id: u64,
    clock: i64,
}

/// In-memory CRM that records every call.
///
/// Search is a substring match over names and tags, which is close enough
/// to Kommo's free-text search for the bridge's purposes.
pub struct MockCrm {
    state: Mutex<State>,
}

impl Default for MockCrm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCrm {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 1000,
                clock: 1_700_000_000,
                ..Default::default()
            }),
        }
    }

    pub fn with_contact(self, contact: CrmContact) -> Self {
        self.lock().contacts.push(contact);
        self
    }

    /// Add a lead and link it to its contacts.
    pub fn with_lead(self, lead: CrmLead) -> Self {
        {
            let mut state = self.lock();
            for contact in state.contacts.iter_mut() {
                if lead.contact_ids.contains(&contact.id) && !contact.lead_ids.contains(&lead.id) {
                    contact.lead_ids.push(lead.id);
                }
            }
            state.leads.push(lead);
        }
        self
    }

    /// Make every call of `op` (e.g. `"create_note"`) fail with a 500.
    pub fn failing(self, op: &'static str) -> Self {
        self.lock().failing.insert(op);
        self
    }

    pub fn calls(&self) -> Vec<CrmCall> {
        self.lock().calls.clone()
    }

    pub fn contacts(&self) -> Vec<CrmContact> {
        self.lock().contacts.clone()
    }

    pub fn leads(&self) -> Vec<CrmLead> {
        self.lock().leads.clone()
    }

    /// `(lead_id, text)` of every note written.
    pub fn notes(&self) -> Vec<(u64, String)> {
        self.lock().notes.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record the call, then fail it if the operation was marked failing.
    fn record(&self, call: CrmCall) -> Result<MutexGuard<'_, State>, BridgeError> {
        let mut state = self.lock();
        let op = call.op();
        state.calls.push(call);
        if state.failing.contains(op) {
            return Err(BridgeError::Http {
                service: "mock-crm",
                status: 500,
                body: format!("{op} failed"),
            });
        }
        Ok(state)
    }
}

impl State {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn tick(&mut self) -> i64 {
        self.clock += 1;
        self.clock
    }

    fn contact_mut(&mut self, id: u64) -> Result<&mut CrmContact, BridgeError> {
        self.contacts
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| BridgeError::NotFound(format!("contact {id}")))
    }
}

#[async_trait]
impl CrmApi for MockCrm {
    async fn list_contacts(&self, query: &str, limit: u32) -> Result<Vec<CrmContact>, BridgeError> {
        let state = self.record(CrmCall::ListContacts {
            query: query.to_string(),
        })?;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(state
            .contacts
            .iter()
            .filter(|c| c.name.contains(query) || c.tags.iter().any(|t| t.contains(query)))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn create_contact(&self, contact: NewContact) -> Result<CrmContact, BridgeError> {
        let mut state = self.record(CrmCall::CreateContact(contact.clone()))?;
        let created = CrmContact {
            id: state.allocate_id(),
            name: contact.name,
            tags: contact.tags,
            lead_ids: Vec::new(),
        };
        state.contacts.push(created.clone());
        Ok(created)
    }

    async fn patch_contact(&self, id: u64, patch: ContactPatch) -> Result<CrmContact, BridgeError> {
        let mut state = self.record(CrmCall::PatchContact {
            id,
            patch: patch.clone(),
        })?;
        let contact = state.contact_mut(id)?;
        if let Some(name) = patch.name {
            contact.name = name;
        }
        for tag in patch.tags_to_add {
            if !contact.has_tag(&tag) {
                contact.tags.push(tag);
            }
        }
        Ok(contact.clone())
    }

    async fn list_leads(&self, query: LeadQuery) -> Result<Vec<CrmLead>, BridgeError> {
        let state = self.record(CrmCall::ListLeads(query))?;
        let mut leads: Vec<CrmLead> = state
            .leads
            .iter()
            .filter(|l| l.contact_ids.contains(&query.contact_id))
            .cloned()
            .collect();
        if query.newest_first {
            leads.sort_by(|a, b| {
                b.created_at
                    .unwrap_or(0)
                    .cmp(&a.created_at.unwrap_or(0))
                    .then(b.id.cmp(&a.id))
            });
        }
        leads.truncate(query.limit as usize);
        Ok(leads)
    }

    async fn create_lead(&self, lead: NewLead) -> Result<CrmLead, BridgeError> {
        let mut state = self.record(CrmCall::CreateLead(lead.clone()))?;
        let id = state.allocate_id();
        let created_at = state.tick();
        if let Ok(contact) = state.contact_mut(lead.contact_id) {
            contact.lead_ids.push(id);
        }
        let created = CrmLead {
            id,
            name: lead.name,
            status_id: None,
            pipeline_id: lead.pipeline_id,
            contact_ids: vec![lead.contact_id],
            created_at: Some(created_at),
        };
        state.leads.push(created.clone());
        Ok(created)
    }

    async fn create_note(&self, lead_id: u64, text: &str) -> Result<(), BridgeError> {
        let mut state = self.record(CrmCall::CreateNote {
            lead_id,
            text: text.to_string(),
        })?;
        if !state.leads.iter().any(|l| l.id == lead_id) {
            return Err(BridgeError::NotFound(format!("lead {lead_id}")));
        }
        state.notes.push((lead_id, text.to_string()));
        Ok(())
    }

    async fn get_contact(&self, id: u64) -> Result<CrmContact, BridgeError> {
        let mut state = self.record(CrmCall::GetContact(id))?;
        let contact = state.contact_mut(id)?.clone();
        Ok(contact)
    }

    async fn get_lead(&self, id: u64, with_contacts: bool) -> Result<CrmLead, BridgeError> {
        let state = self.record(CrmCall::GetLead(id))?;
        let mut lead = state
            .leads
            .iter()
            .find(|l| l.id == id)
            .cloned()
            .ok_or_else(|| BridgeError::NotFound(format!("lead {id}")))?;
        if !with_contacts {
            lead.contact_ids.clear();
        }
        Ok(lead)
    }
}
