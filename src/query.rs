//! Query strings in the backend's nested bracket convention.
//!
//! `Query::new().fields_all().filters(json!({"user": {"$eq": 7}}))` becomes
//! `fields=*&filters[user][$eq]=7`. Keys stay literal; only values are
//! URL-encoded. Filter trees are forwarded as given and never validated.

use serde_json::Value;
use std::collections::BTreeMap;
use url::form_urlencoded;

#[derive(Debug, Clone, PartialEq)]
pub enum Fields {
    All,
    Only(Vec<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pagination {
    Page { page: u32, page_size: u32 },
    Offset { start: u32, limit: u32 },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Relation {
    fields: Option<Fields>,
    populate: Option<Populate>,
    filters: Option<Value>,
    sort: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Populate {
    All,
    Relations(BTreeMap<String, Relation>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    fields: Option<Fields>,
    populate: Option<Populate>,
    filters: Option<Value>,
    sort: Vec<String>,
    pagination: Option<Pagination>,
}

fn owned<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

fn add_relation(populate: &mut Option<Populate>, name: &str, relation: Relation) {
    match populate {
        Some(Populate::Relations(map)) => {
            map.insert(name.to_string(), relation);
        }
        _ => {
            let mut map = BTreeMap::new();
            map.insert(name.to_string(), relation);
            *populate = Some(Populate::Relations(map));
        }
    }
}

impl Relation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(Fields::Only(owned(fields)));
        self
    }

    pub fn fields_all(mut self) -> Self {
        self.fields = Some(Fields::All);
        self
    }

    pub fn populate(mut self, name: &str, relation: Relation) -> Self {
        add_relation(&mut self.populate, name, relation);
        self
    }

    pub fn populate_all(mut self) -> Self {
        self.populate = Some(Populate::All);
        self
    }

    pub fn filters(mut self, filters: Value) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn sort(mut self, key: &str) -> Self {
        self.sort.push(key.to_string());
        self
    }

    /// A relation that contributes no parameters, such as an empty field
    /// list, is still populated in full as `prefix=*`.
    fn write_pairs(&self, prefix: &str, pairs: &mut Vec<(String, String)>) {
        let before = pairs.len();
        write_fields(&format!("{prefix}[fields]"), self.fields.as_ref(), pairs);
        write_populate(&format!("{prefix}[populate]"), self.populate.as_ref(), pairs);
        if let Some(filters) = &self.filters {
            flatten(&format!("{prefix}[filters]"), filters, pairs);
        }
        write_list(&format!("{prefix}[sort]"), &self.sort, pairs);
        if pairs.len() == before {
            pairs.push((prefix.to_string(), "*".to_string()));
        }
    }
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(Fields::Only(owned(fields)));
        self
    }

    pub fn fields_all(mut self) -> Self {
        self.fields = Some(Fields::All);
        self
    }

    pub fn populate(mut self, name: &str, relation: Relation) -> Self {
        add_relation(&mut self.populate, name, relation);
        self
    }

    pub fn populate_all(mut self) -> Self {
        self.populate = Some(Populate::All);
        self
    }

    pub fn filters(mut self, filters: Value) -> Self {
        self.filters = Some(filters);
        self
    }

    pub fn sort(mut self, key: &str) -> Self {
        self.sort.push(key.to_string());
        self
    }

    pub fn page(mut self, page: u32, page_size: u32) -> Self {
        self.pagination = Some(Pagination::Page { page, page_size });
        self
    }

    pub fn offset(mut self, start: u32, limit: u32) -> Self {
        self.pagination = Some(Pagination::Offset { start, limit });
        self
    }

    /// Ordered `(key, value)` pairs before encoding.
    pub fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();

        write_fields("fields", self.fields.as_ref(), &mut pairs);
        write_populate("populate", self.populate.as_ref(), &mut pairs);
        if let Some(filters) = &self.filters {
            flatten("filters", filters, &mut pairs);
        }
        write_list("sort", &self.sort, &mut pairs);

        match self.pagination {
            Some(Pagination::Page { page, page_size }) => {
                pairs.push(("pagination[page]".to_string(), page.to_string()));
                pairs.push(("pagination[pageSize]".to_string(), page_size.to_string()));
            }
            Some(Pagination::Offset { start, limit }) => {
                pairs.push(("pagination[start]".to_string(), start.to_string()));
                pairs.push(("pagination[limit]".to_string(), limit.to_string()));
            }
            None => {}
        }

        pairs
    }

    pub fn to_query_string(&self) -> String {
        self.pairs()
            .into_iter()
            .map(|(key, value)| format!("{}={}", key, encode_value(&value)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

fn encode_value(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

fn write_fields(prefix: &str, fields: Option<&Fields>, pairs: &mut Vec<(String, String)>) {
    match fields {
        Some(Fields::All) => pairs.push((prefix.to_string(), "*".to_string())),
        Some(Fields::Only(list)) => write_list(prefix, list, pairs),
        None => {}
    }
}

fn write_populate(prefix: &str, populate: Option<&Populate>, pairs: &mut Vec<(String, String)>) {
    match populate {
        Some(Populate::All) => pairs.push((prefix.to_string(), "*".to_string())),
        Some(Populate::Relations(map)) => {
            for (name, relation) in map {
                relation.write_pairs(&format!("{prefix}[{name}]"), pairs);
            }
        }
        None => {}
    }
}

fn write_list(prefix: &str, items: &[String], pairs: &mut Vec<(String, String)>) {
    for (i, item) in items.iter().enumerate() {
        pairs.push((format!("{prefix}[{i}]"), item.clone()));
    }
}

fn flatten(prefix: &str, value: &Value, pairs: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(&format!("{prefix}[{key}]"), nested, pairs);
            }
        }
        Value::Array(items) => {
            for (i, nested) in items.iter().enumerate() {
                flatten(&format!("{prefix}[{i}]"), nested, pairs);
            }
        }
        Value::String(s) => pairs.push((prefix.to_string(), s.clone())),
        Value::Null => pairs.push((prefix.to_string(), String::new())),
        other => pairs.push((prefix.to_string(), other.to_string())),
    }
}
