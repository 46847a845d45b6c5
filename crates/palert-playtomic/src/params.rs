//! Search-parameter builders for the catalog endpoints.
//!
//! Each builder renders to the flat key/value list the provider expects:
//! empty fields are omitted, club scopes are comma-joined under `tenant_id`.

/// Parameters for `/matches`.
#[derive(Debug, Clone, Default)]
pub struct SearchMatchesParams {
    pub sort: String,
    pub has_players: bool,
    pub sport_id: String,
    pub tenant_ids: Vec<String>,
    pub visibility: String,
    pub from_start_date: String,
    pub size: u32,
    pub page: u32,
}

impl SearchMatchesParams {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        push_if_set(&mut query, "sort", &self.sort);
        if self.has_players {
            query.push(("has_players", "true".to_string()));
        }
        push_if_set(&mut query, "sport_id", &self.sport_id);
        if !self.tenant_ids.is_empty() {
            query.push(("tenant_id", self.tenant_ids.join(",")));
        }
        push_if_set(&mut query, "visibility", &self.visibility);
        push_if_set(&mut query, "from_start_date", &self.from_start_date);
        if self.size > 0 {
            query.push(("size", self.size.to_string()));
        }
        if self.page > 0 {
            query.push(("page", self.page.to_string()));
        }
        query
    }
}

/// Parameters for `/classes`.
#[derive(Debug, Clone, Default)]
pub struct SearchClassesParams {
    pub sort: String,
    pub status: String,
    pub tenant_ids: Vec<String>,
    pub include_summary: bool,
    pub course_visibility: String,
    pub from_start_date: String,
    pub size: u32,
    pub page: u32,
}

impl SearchClassesParams {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        push_if_set(&mut query, "sort", &self.sort);
        push_if_set(&mut query, "status", &self.status);
        if !self.tenant_ids.is_empty() {
            query.push(("tenant_id", self.tenant_ids.join(",")));
        }
        if self.include_summary {
            query.push(("include_summary", "true".to_string()));
        }
        if self.size > 0 {
            query.push(("size", self.size.to_string()));
        }
        query.push(("page", self.page.to_string()));
        push_if_set(&mut query, "course_visibility", &self.course_visibility);
        push_if_set(&mut query, "from_start_date", &self.from_start_date);
        query
    }
}

/// Parameters for `/lessons`. The endpoint accepts a single club per query,
/// so there is no multi-tenant scope here.
#[derive(Debug, Clone, Default)]
pub struct SearchLessonsParams {
    pub sort: String,
    pub tenant_id: String,
    pub tournament_visibility: String,
    pub status: String,
    pub from_start_date: String,
    pub size: u32,
    pub page: u32,
}

impl SearchLessonsParams {
    pub fn to_query(&self) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        push_if_set(&mut query, "sort", &self.sort);
        push_if_set(&mut query, "tenant_id", &self.tenant_id);
        push_if_set(&mut query, "tournament_visibility", &self.tournament_visibility);
        push_if_set(&mut query, "status", &self.status);
        if self.size > 0 {
            query.push(("size", self.size.to_string()));
        }
        query.push(("page", self.page.to_string()));
        push_if_set(&mut query, "from_start_date", &self.from_start_date);
        query
    }
}

fn push_if_set(query: &mut Vec<(&'static str, String)>, key: &'static str, value: &str) {
    let trimmed = value.trim();
    if !trimmed.is_empty() {
        query.push((key, trimmed.to_string()));
    }
}
