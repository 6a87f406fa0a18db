//! HTTP adapter over a REST-style record service.
//!
//! Routes are `{base_url}/{resource_prefix}/{table}[/{id}]`. Filters and sorts travel as
//! base64 JSON in the `filter` and `sort` query parameters, with `limit`/`offset` for
//! pagination and every [`QueryOption`] appended as an extra parameter.
//!
//! Batch updates look every id up before the first `PUT` and fail with `UpdateFailed`
//! if any is missing or repeated. The service offers no transaction, so a record
//! deleted between that lookup and its `PUT` still leaves the batch partly applied.

use crate::codec::encode_json_base64;
use crate::config::HttpConfig;
use crate::eval::run_query;
use crate::model::{Storable, Value, Viewable};
use crate::query::{Expression, Query, QueryOption, Sort};
use crate::traits::{Adapter, Connection, QueryWindow, ReadAdapter};
use crate::{StorageError, StorageResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Body of `GET /{prefix}/{table}/count`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: usize,
}

pub struct HttpAdapter<R> {
    client: Client,
    base_url: String,
    resource_prefix: String,
    _record: PhantomData<fn() -> R>,
}

impl<R> HttpAdapter<R>
where
    R: Viewable + Serialize + DeserializeOwned,
{
    /// Create an adapter for `base_url` with a 30 second request timeout.
    pub fn new(base_url: &str, resource_prefix: &str) -> StorageResult<Self> {
        Self::with_timeout(base_url, resource_prefix, Duration::from_secs(30))
    }

    pub fn from_config(config: &HttpConfig) -> StorageResult<Self> {
        Self::with_timeout(
            &config.base_url,
            &config.resource_prefix,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_timeout(
        base_url: &str,
        resource_prefix: &str,
        timeout: Duration,
    ) -> StorageResult<Self> {
        let base_url = base_url.trim_end_matches('/');
        Url::parse(base_url).map_err(|err| StorageError::Url(format!("{base_url}: {err}")))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| StorageError::NoResponse(err.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            resource_prefix: resource_prefix.trim_matches('/').to_string(),
            _record: PhantomData,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self) -> String {
        if self.resource_prefix.is_empty() {
            format!("{}/{}", self.base_url, R::TABLE.name())
        } else {
            format!(
                "{}/{}/{}",
                self.base_url,
                self.resource_prefix,
                R::TABLE.name()
            )
        }
    }

    fn record_url(&self, id: &str) -> String {
        format!("{}/{}", self.collection_url(), id)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> StorageResult<Option<T>> {
        let response = request
            .send()
            .await
            .map_err(|err| StorageError::NoResponse(err.to_string()))?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> StorageResult<Option<T>> {
        let status = response.status();

        if status == StatusCode::NO_CONTENT {
            Ok(None)
        } else if status.is_success() {
            let body = response
                .bytes()
                .await
                .map_err(|err| StorageError::NoResponse(err.to_string()))?;
            if body.is_empty() {
                return Ok(None);
            }
            serde_json::from_slice(&body)
                .map(Some)
                .map_err(|err| StorageError::DecodeFailed(err.to_string()))
        } else if status == StatusCode::NOT_FOUND {
            Err(StorageError::NoResult(format!(
                "{} resource not found",
                R::TABLE
            )))
        } else {
            let message = response.text().await.unwrap_or_default();
            Err(StorageError::HttpResponse {
                status: status.as_u16(),
                message,
            })
        }
    }

    /// Fetch with a remote-safe (or absent) query: the server filters and pages.
    async fn fetch_remote(
        &self,
        query: Option<&Query>,
        sorts: &[Sort],
        window: QueryWindow,
        options: &[QueryOption],
    ) -> StorageResult<Vec<R>> {
        let mut params = Vec::new();
        if let Some(query) = query {
            params.push(("filter".to_string(), encode_json_base64(query)?));
        }
        if !sorts.is_empty() {
            params.push(("sort".to_string(), encode_json_base64(sorts)?));
        }
        if window.limit > 0 {
            params.push(("limit".to_string(), window.limit.to_string()));
        }
        if window.offset > 0 {
            params.push(("offset".to_string(), window.offset.to_string()));
        }
        params.extend(option_params(options));

        let request = self.client.get(self.collection_url()).query(&params);
        let records: Vec<R> = self.send(request).await?.unwrap_or_default();
        debug!(table = %R::TABLE, results = records.len(), "fetched remote records");
        Ok(records)
    }
}

/// `QueryOption`s as query-string pairs.
fn option_params(options: &[QueryOption]) -> Vec<(String, String)> {
    options
        .iter()
        .map(|option| (option.key.clone(), param_value(&option.value)))
        .collect()
}

fn param_value(value: &Value) -> String {
    match value {
        Value::Text(text) => text.clone(),
        other => other.to_string(),
    }
}

#[async_trait]
impl<R> Connection for HttpAdapter<R>
where
    R: Viewable + Serialize + DeserializeOwned,
{
    async fn connect(&self) -> StorageResult<bool> {
        info!(table = %R::TABLE, url = %self.collection_url(), "http adapter ready");
        Ok(true)
    }

    async fn disconnect(&self) -> StorageResult<bool> {
        Ok(true)
    }
}

#[async_trait]
impl<R> ReadAdapter<R> for HttpAdapter<R>
where
    R: Viewable + Serialize + DeserializeOwned,
{
    async fn find(&self, id: &str, options: &[QueryOption]) -> StorageResult<R> {
        let request = self
            .client
            .get(self.record_url(id))
            .query(&option_params(options));
        self.send(request)
            .await?
            .ok_or_else(|| StorageError::NoResult(format!("{} {id} not found", R::TABLE)))
    }

    async fn find_all(
        &self,
        ids: &[String],
        sorts: &[Sort],
        window: QueryWindow,
        options: &[QueryOption],
    ) -> StorageResult<Vec<R>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let query = Query::or(
            ids.iter()
                .map(|id| Expression::equal(R::ID_KEY, id.as_str())),
        );
        self.fetch_remote(Some(&query), sorts, window, options)
            .await
    }

    async fn fetch(
        &self,
        query: Option<&Query>,
        sorts: &[Sort],
        window: QueryWindow,
        options: &[QueryOption],
    ) -> StorageResult<Vec<R>> {
        match query {
            Some(query) if !query.is_remote_safe() => {
                warn!(
                    table = %R::TABLE,
                    query = %query,
                    "filter cannot be sent to the server; evaluating locally"
                );
                let records = self
                    .fetch_remote(None, sorts, QueryWindow::ALL, options)
                    .await?;
                Ok(run_query(&records, Some(query), sorts, window))
            }
            query => self.fetch_remote(query, sorts, window, options).await,
        }
    }

    async fn count(&self, query: Option<&Query>, options: &[QueryOption]) -> StorageResult<usize> {
        if let Some(query) = query.filter(|query| !query.is_remote_safe()) {
            warn!(
                table = %R::TABLE,
                query = %query,
                "filter cannot be sent to the server; counting locally"
            );
            let records = self
                .fetch_remote(None, &[], QueryWindow::ALL, options)
                .await?;
            return Ok(records.iter().filter(|r| query.evaluate(*r)).count());
        }

        let mut params = Vec::new();
        if let Some(query) = query {
            params.push(("filter".to_string(), encode_json_base64(query)?));
        }
        params.extend(option_params(options));
        let request = self
            .client
            .get(format!("{}/count", self.collection_url()))
            .query(&params);
        let count = self
            .send::<CountResponse>(request)
            .await?
            .map(|response| response.count)
            .unwrap_or(0);
        Ok(count)
    }
}

#[async_trait]
impl<R> Adapter<R> for HttpAdapter<R>
where
    R: Storable + Serialize + DeserializeOwned,
{
    async fn insert(&self, record: R, options: &[QueryOption]) -> StorageResult<R> {
        let request = self
            .client
            .post(self.collection_url())
            .query(&option_params(options))
            .json(&record);
        let stored = self.send(request).await?.unwrap_or(record);
        debug!(table = %R::TABLE, id = %stored.id(), "inserted remote record");
        Ok(stored)
    }

    async fn insert_all(&self, records: Vec<R>, options: &[QueryOption]) -> StorageResult<Vec<R>> {
        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            stored.push(self.insert(record, options).await?);
        }
        Ok(stored)
    }

    async fn update(&self, record: R, options: &[QueryOption]) -> StorageResult<R> {
        let request = self
            .client
            .put(self.record_url(record.id()))
            .query(&option_params(options))
            .json(&record);
        let stored = self.send(request).await?.unwrap_or(record);
        debug!(table = %R::TABLE, id = %stored.id(), "updated remote record");
        Ok(stored)
    }

    async fn update_all(&self, records: Vec<R>, options: &[QueryOption]) -> StorageResult<Vec<R>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = records.iter().map(|record| record.id().to_string()).collect();
        let mut seen = HashSet::new();
        if let Some(repeated) = ids.iter().find(|id| !seen.insert(id.as_str())) {
            return Err(StorageError::UpdateFailed(format!(
                "{} {repeated} appears more than once",
                R::TABLE
            )));
        }
        let existing: HashSet<String> = self
            .find_all(&ids, &[], QueryWindow::ALL, options)
            .await?
            .iter()
            .map(|record| record.id().to_string())
            .collect();
        if let Some(missing) = ids.iter().find(|id| !existing.contains(id.as_str())) {
            return Err(StorageError::UpdateFailed(format!(
                "{} {missing} does not exist",
                R::TABLE
            )));
        }

        let mut stored = Vec::with_capacity(records.len());
        for record in records {
            stored.push(self.update(record, options).await?);
        }
        Ok(stored)
    }

    async fn delete(&self, id: &str, options: &[QueryOption]) -> StorageResult<bool> {
        let request = self
            .client
            .delete(self.record_url(id))
            .query(&option_params(options));
        self.send::<serde_json::Value>(request).await?;
        debug!(table = %R::TABLE, id = %id, "deleted remote record");
        Ok(true)
    }

    async fn delete_all(&self, ids: &[String], options: &[QueryOption]) -> StorageResult<bool> {
        for id in ids {
            match self.delete(id, options).await {
                Ok(_) | Err(StorageError::NoResult(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Table;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Pet {
        id: String,
        owner_id: String,
        name: String,
    }

    impl Viewable for Pet {
        const TABLE: Table = Table::new("pets", "pet_id");

        fn id(&self) -> &str {
            &self.id
        }

        fn field(&self, key: &str) -> Value {
            match key {
                "owner_id" => Value::from(&self.owner_id),
                "name" => Value::from(&self.name),
                _ => Value::Null,
            }
        }
    }

    impl Storable for Pet {}

    fn pet(id: &str, name: &str) -> Pet {
        Pet {
            id: id.to_string(),
            owner_id: "o1".to_string(),
            name: name.to_string(),
        }
    }

    async fn adapter(server: &MockServer) -> HttpAdapter<Pet> {
        HttpAdapter::new(&format!("{}/", server.uri()), "/api/").unwrap()
    }

    #[test]
    fn rejects_invalid_base_url() {
        let result = HttpAdapter::<Pet>::new("not a url", "api");
        assert!(matches!(result, Err(StorageError::Url(_))));
    }

    #[tokio::test]
    async fn routes_use_prefix_and_table() {
        let server = MockServer::start().await;
        let adapter = adapter(&server).await;
        assert_eq!(adapter.base_url(), server.uri());
        assert_eq!(adapter.record_url("p1"), format!("{}/api/pets/p1", server.uri()));
    }

    #[tokio::test]
    async fn find_gets_record_by_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pets/p1"))
            .and(query_param("include", "owner"))
            .respond_with(ResponseTemplate::new(200).set_body_json(pet("p1", "Rex")))
            .mount(&server)
            .await;

        let found = adapter(&server)
            .await
            .find("p1", &[QueryOption::new("include", "owner")])
            .await
            .unwrap();
        assert_eq!(found, pet("p1", "Rex"));
    }

    #[tokio::test]
    async fn not_found_maps_to_no_result() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pets/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let result = adapter(&server).await.find("missing", &[]).await;
        assert!(matches!(result, Err(StorageError::NoResult(_))));
    }

    #[tokio::test]
    async fn server_error_carries_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pets"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .mount(&server)
            .await;

        let result = adapter(&server)
            .await
            .fetch(None, &[], QueryWindow::ALL, &[])
            .await;
        assert!(matches!(
            result,
            Err(StorageError::HttpResponse { status: 503, ref message }) if message == "maintenance"
        ));
    }

    #[tokio::test]
    async fn fetch_sends_encoded_filter_and_window() {
        let server = MockServer::start().await;
        let query = Query::expression(Expression::equal("owner_id", "o1"));
        let sorts = vec![Sort::descending("name")];
        Mock::given(method("GET"))
            .and(path("/api/pets"))
            .and(query_param("filter", encode_json_base64(&query).unwrap()))
            .and(query_param("sort", encode_json_base64(&sorts).unwrap()))
            .and(query_param("limit", "2"))
            .and(query_param("offset", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![pet("p2", "Ace")]))
            .mount(&server)
            .await;

        let records = adapter(&server)
            .await
            .fetch(Some(&query), &sorts, QueryWindow::new(2, 1), &[])
            .await
            .unwrap();
        assert_eq!(records, vec![pet("p2", "Ace")]);
    }

    #[tokio::test]
    async fn unsafe_filter_is_evaluated_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pets"))
            .and(query_param_is_missing("filter"))
            .respond_with(ResponseTemplate::new(200).set_body_json(vec![
                pet("p1", "Rex"),
                pet("p2", "Ace"),
                pet("p3", "Bo"),
            ]))
            .mount(&server)
            .await;

        let adapter = adapter(&server).await;
        let query = Query::expression(Expression::inside("id", ["p1", "p3"]));
        let records = adapter
            .fetch(Some(&query), &[Sort::ascending("name")], QueryWindow::ALL, &[])
            .await
            .unwrap();
        assert_eq!(records, vec![pet("p3", "Bo"), pet("p1", "Rex")]);
        assert_eq!(adapter.count(Some(&query), &[]).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn count_reads_count_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pets/count"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": 3 })))
            .mount(&server)
            .await;

        assert_eq!(adapter(&server).await.count(None, &[]).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn insert_posts_record() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/pets"))
            .and(body_json(json!({ "id": "p1", "owner_id": "o1", "name": "Rex" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(pet("p1", "Rex")))
            .expect(1)
            .mount(&server)
            .await;

        let stored = adapter(&server)
            .await
            .insert(pet("p1", "Rex"), &[])
            .await
            .unwrap();
        assert_eq!(stored, pet("p1", "Rex"));
    }

    #[tokio::test]
    async fn update_with_empty_response_echoes_record() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/pets/p1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let updated = adapter(&server)
            .await
            .update(pet("p1", "Max"), &[])
            .await
            .unwrap();
        assert_eq!(updated.name, "Max");
    }

    #[tokio::test]
    async fn update_all_with_unknown_id_sends_no_put() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pets"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([pet("p1", "Rex")])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(204))
            .expect(0)
            .mount(&server)
            .await;

        let result = adapter(&server)
            .await
            .update_all(vec![pet("p1", "Max"), pet("p9", "Ghost")], &[])
            .await;
        assert!(matches!(result, Err(StorageError::UpdateFailed(message)) if message.contains("p9")));
    }

    #[tokio::test]
    async fn update_all_puts_each_record_once_all_exist() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/pets"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!([pet("p1", "Rex"), pet("p2", "Fido")])),
            )
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/pets/p1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/api/pets/p2"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let updated = adapter(&server)
            .await
            .update_all(vec![pet("p1", "Max"), pet("p2", "Bo")], &[])
            .await
            .unwrap();
        let names: Vec<_> = updated.iter().map(|pet| pet.name.as_str()).collect();
        assert_eq!(names, ["Max", "Bo"]);
    }

    #[tokio::test]
    async fn delete_all_skips_missing_records() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/pets/p1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/pets/gone"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let ids = vec!["p1".to_string(), "gone".to_string()];
        assert!(adapter(&server).await.delete_all(&ids, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_server_is_no_response() {
        let adapter = HttpAdapter::<Pet>::with_timeout(
            "http://127.0.0.1:9",
            "api",
            Duration::from_millis(200),
        )
        .unwrap();
        let result = adapter.find("p1", &[]).await;
        assert!(matches!(result, Err(StorageError::NoResponse(_))));
    }
}
