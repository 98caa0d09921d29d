use crate::services::store::{DocumentStore, ALL_INDICES};
use anyhow::Result;
use elasticsearch::{
    indices::IndicesCreateParts, CreateParts, DeleteParts, Elasticsearch, GetParts, IndexParts,
    SearchParts, UpdateParts,
};
use log::{error, info};
use serde_json::{json, Map, Value};

const MAX_FIND_RESULTS: usize = 10_000;

/// Ids and enums are keywords for exact term filters. Free text is `text`,
/// and keywords past 256 chars are left unindexed so long strings still store.
fn index_mapping() -> Value {
    json!({
        "mappings": {
            "date_detection": false,
            "dynamic_templates": [
                {
                    "strings_as_keywords": {
                        "match_mapping_type": "string",
                        "mapping": { "type": "keyword", "ignore_above": 256 }
                    }
                }
            ],
            "properties": {
                "title": { "type": "text" },
                "description": { "type": "text" }
            }
        }
    })
}

pub async fn create_es_indices(es_client: &Elasticsearch) {
    let create_index_body = index_mapping();

    for index in ALL_INDICES {
        match es_client
            .indices()
            .create(IndicesCreateParts::Index(index))
            .body(create_index_body.clone())
            .send()
            .await
        {
            Ok(response) => {
                if response.status_code().is_success() {
                    info!("Elasticsearch index '{index}' created.");
                } else {
                    let response_text = response.text().await.unwrap_or_default();
                    if response_text.contains("resource_already_exists_exception") {
                        info!("Elasticsearch index '{index}' already exists.");
                    } else {
                        error!("Failed to create Elasticsearch index '{index}': {response_text}");
                    }
                }
            }
            Err(e) => {
                error!("Failed to connect to Elasticsearch to create index '{index}': {e:?}");
            }
        }
    }
}

pub struct EsStore {
    client: Elasticsearch,
}

impl EsStore {
    pub fn new(client: Elasticsearch) -> Self {
        EsStore { client }
    }
}

fn find_query(filters: &[(&str, &str)]) -> Value {
    let terms: Vec<Value> = filters
        .iter()
        .map(|(field, value)| json!({ "term": { *field: *value } }))
        .collect();

    json!({
        "size": MAX_FIND_RESULTS,
        "query": {
            "bool": {
                "filter": terms
            }
        }
    })
}

/// Scripted update that adds to existing counters, or inserts `seed` with the
/// deltas already applied when the document does not exist yet.
fn increment_body(deltas: &[(&str, i64)], seed: Value) -> Value {
    let mut source = String::new();
    let mut params = Map::new();
    let mut upsert = seed;

    for (field, delta) in deltas {
        source.push_str(&format!(
            "ctx._source.{field} = (ctx._source.{field} == null ? 0 : ctx._source.{field}) \
             + params.{field}; "
        ));
        params.insert(field.to_string(), json!(delta));
        if let Some(fields) = upsert.as_object_mut() {
            let current = fields.get(*field).and_then(Value::as_i64).unwrap_or(0);
            fields.insert(field.to_string(), json!(current + delta));
        }
    }

    json!({
        "script": {
            "source": source.trim_end(),
            "lang": "painless",
            "params": params
        },
        "upsert": upsert
    })
}

#[rocket::async_trait]
impl DocumentStore for EsStore {
    async fn get(&self, index: &str, id: &str) -> Result<Option<Value>> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await?;

        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status_code().is_success() {
            return Err(anyhow::anyhow!(
                "Elasticsearch get {index}/{id} failed with status: {}",
                response.status_code()
            ));
        }

        let json_response: Value = response.json().await?;
        Ok(json_response.get("_source").cloned())
    }

    async fn put(&self, index: &str, id: &str, doc: Value) -> Result<()> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(doc)
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to index {index}/{id}: {}",
                response.text().await.unwrap_or_default()
            ));
        }
        Ok(())
    }

    async fn create(&self, index: &str, id: &str, doc: Value) -> Result<bool> {
        let response = self
            .client
            .create(CreateParts::IndexId(index, id))
            .body(doc)
            .send()
            .await?;

        match response.status_code().as_u16() {
            409 => Ok(false),
            _ if response.status_code().is_success() => Ok(true),
            _ => Err(anyhow::anyhow!(
                "Failed to create {index}/{id}: {}",
                response.text().await.unwrap_or_default()
            )),
        }
    }

    async fn delete(&self, index: &str, id: &str) -> Result<bool> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await?;

        match response.status_code().as_u16() {
            404 => Ok(false),
            _ if response.status_code().is_success() => Ok(true),
            _ => Err(anyhow::anyhow!(
                "Failed to delete {index}/{id} with status: {}",
                response.status_code()
            )),
        }
    }

    async fn find(&self, index: &str, filters: &[(&str, &str)]) -> Result<Vec<Value>> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(find_query(filters))
            .send()
            .await?;

        // A missing index just means nothing was written yet.
        if response.status_code().as_u16() == 404 {
            return Ok(Vec::new());
        }
        if !response.status_code().is_success() {
            return Err(anyhow::anyhow!(
                "Elasticsearch search on {index} failed with status: {}",
                response.status_code()
            ));
        }

        let json_response: Value = response.json().await?;
        let mut docs = Vec::new();
        if let Some(hits) = json_response["hits"]["hits"].as_array() {
            for hit in hits {
                if let Some(source) = hit.get("_source") {
                    docs.push(source.clone());
                }
            }
        }
        Ok(docs)
    }

    async fn increment(
        &self,
        index: &str,
        id: &str,
        deltas: &[(&str, i64)],
        seed: Value,
    ) -> Result<()> {
        let response = self
            .client
            .update(UpdateParts::IndexId(index, id))
            .retry_on_conflict(3)
            .body(increment_body(deltas, seed))
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(anyhow::anyhow!(
                "Failed to increment {index}/{id}: {}",
                response.text().await.unwrap_or_default()
            ));
        }
        Ok(())
    }
}
