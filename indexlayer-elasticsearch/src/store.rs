use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client, Method, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::{env, time::Duration};
use tracing::{debug, trace};

use indexlayer_core::{
    backend::{SearchBackend, SearchBackendBuilder},
    bulk::BulkInstruction,
    error::{IndexStoreError, IndexStoreResult},
    request::{
        BulkResponse, DeleteByQueryResponse, GetResponse, IndexInfo, ReadOptions, Refresh,
        SearchBody, SearchResponse, WriteOptions,
    },
    schema::{FieldDescriptor, IndexDefinition},
};

use crate::wire::{ndjson, search_response, Reply};

/// Server URL used when none is configured.
pub const DEFAULT_URL: &str = "http://localhost:9200";

#[derive(Debug, Clone)]
struct Credentials {
    username: String,
    password: Option<String>,
}

/// Search backend talking to an Elasticsearch-compatible server over its REST API.
#[derive(Debug, Clone)]
pub struct ElasticsearchStore {
    client: Client,
    base_url: Url,
    credentials: Option<Credentials>,
}

impl ElasticsearchStore {
    pub fn builder(url: &str) -> ElasticsearchStoreBuilder {
        ElasticsearchStoreBuilder::new(url)
    }

    /// Returns the server URL requests are sent to.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, segments: &[&str]) -> IndexStoreResult<Url> {
        let mut url = self.base_url.clone();

        url.path_segments_mut()
            .map_err(|_| IndexStoreError::Initialization(format!("`{}` cannot be used as a base URL", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> IndexStoreResult<RequestBuilder> {
        let url = self.endpoint(segments)?;
        debug!(method = %method, url = %url, "elasticsearch request");

        let request = self.client.request(method, url);

        Ok(match &self.credentials {
            Some(credentials) => request.basic_auth(&credentials.username, credentials.password.as_ref()),
            None => request,
        })
    }

    async fn send(&self, request: RequestBuilder) -> IndexStoreResult<Reply> {
        let response = request
            .send()
            .await
            .map_err(|e| IndexStoreError::Backend(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| IndexStoreError::Backend(e.to_string()))?;

        trace!(status = status.as_u16(), bytes = text.len(), "elasticsearch response");

        Reply::new(status, &text)
    }
}

#[derive(Deserialize)]
struct MgetReply {
    #[serde(default)]
    docs: Vec<GetResponse>,
}

#[derive(Deserialize)]
struct CountReply {
    count: u64,
}

/// `_delete_by_query` only accepts a boolean refresh.
fn delete_by_query_params(options: &WriteOptions) -> Vec<(&'static str, String)> {
    let mut options = options.clone();

    if options.refresh == Some(Refresh::WaitFor) {
        options.refresh = Some(Refresh::True);
    }

    options.query_params()
}

#[async_trait]
impl SearchBackend for ElasticsearchStore {
    async fn get_index(&self, index: &str) -> IndexStoreResult<IndexInfo> {
        self.send(self.request(Method::GET, &[index])?)
            .await?
            .index_info(index)
    }

    async fn create_index(&self, index: &str, definition: &IndexDefinition) -> IndexStoreResult<()> {
        self.send(self.request(Method::PUT, &[index])?.json(definition))
            .await?
            .created_index(index)
    }

    async fn put_settings(&self, index: &str, settings: Map<String, Value>) -> IndexStoreResult<()> {
        self.send(
            self.request(Method::PUT, &[index, "_settings"])?
                .json(&json!({ "index": settings })),
        )
        .await?
        .ok(index)
    }

    async fn put_mapping(
        &self,
        index: &str,
        field: &str,
        descriptor: &FieldDescriptor,
    ) -> IndexStoreResult<()> {
        let mut properties = Map::new();
        properties.insert(field.to_string(), descriptor.to_value()?);

        self.send(
            self.request(Method::PUT, &[index, "_mapping"])?
                .json(&json!({ "properties": properties })),
        )
        .await?
        .ok(index)
    }

    async fn create_document(
        &self,
        index: &str,
        id: &str,
        document: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        self.send(
            self.request(Method::PUT, &[index, "_create", id])?
                .query(&options.query_params())
                .json(&document),
        )
        .await?
        .created_document(index, id)
    }

    async fn update_document(
        &self,
        index: &str,
        id: &str,
        partial: Map<String, Value>,
        options: &WriteOptions,
    ) -> IndexStoreResult<()> {
        self.send(
            self.request(Method::POST, &[index, "_update", id])?
                .query(&options.query_params())
                .json(&json!({ "doc": partial })),
        )
        .await?
        .updated_document(index, id)
    }

    async fn delete_document(&self, index: &str, id: &str, options: &WriteOptions) -> IndexStoreResult<()> {
        self.send(
            self.request(Method::DELETE, &[index, "_doc", id])?
                .query(&options.query_params()),
        )
        .await?
        .deleted_document(index, id)
    }

    async fn get_document(&self, index: &str, id: &str) -> IndexStoreResult<GetResponse> {
        self.send(self.request(Method::GET, &[index, "_doc", id])?)
            .await?
            .document(index)
    }

    async fn mget_documents(&self, index: &str, ids: &[String]) -> IndexStoreResult<Vec<GetResponse>> {
        let reply: MgetReply = self
            .send(
                self.request(Method::POST, &[index, "_mget"])?
                    .json(&json!({ "ids": ids })),
            )
            .await?
            .parse(index)?;

        Ok(reply.docs)
    }

    async fn search(
        &self,
        index: &str,
        body: &SearchBody,
        options: &ReadOptions,
    ) -> IndexStoreResult<SearchResponse> {
        let reply = self
            .send(
                self.request(Method::POST, &[index, "_search"])?
                    .query(&options.query_params())
                    .json(body),
            )
            .await?;

        if !reply.is_success() {
            return Err(reply.into_error(index));
        }

        search_response(reply.body)
    }

    async fn count(&self, index: &str, query: Option<&Value>, options: &ReadOptions) -> IndexStoreResult<u64> {
        let mut request = self
            .request(Method::POST, &[index, "_count"])?
            .query(&options.query_params());

        if let Some(query) = query {
            request = request.json(&json!({ "query": query }));
        }

        let reply: CountReply = self.send(request).await?.parse(index)?;

        Ok(reply.count)
    }

    async fn delete_by_query(
        &self,
        index: &str,
        query: &Value,
        options: &WriteOptions,
    ) -> IndexStoreResult<DeleteByQueryResponse> {
        self.send(
            self.request(Method::POST, &[index, "_delete_by_query"])?
                .query(&delete_by_query_params(options))
                .json(&json!({ "query": query })),
        )
        .await?
        .parse(index)
    }

    async fn bulk(
        &self,
        index: &str,
        instructions: &[BulkInstruction],
        options: &WriteOptions,
    ) -> IndexStoreResult<BulkResponse> {
        let body = ndjson(instructions)?;

        self.send(
            self.request(Method::POST, &[index, "_bulk"])?
                .query(&options.query_params())
                .header(CONTENT_TYPE, "application/x-ndjson")
                .body(body),
        )
        .await?
        .parse(index)
    }
}

/// Builder for [`ElasticsearchStore`].
///
/// # Example
///
/// ```ignore
/// use indexlayer::{backend::SearchBackendBuilder, elasticsearch::ElasticsearchStore};
/// use std::time::Duration;
///
/// let store = ElasticsearchStore::builder("https://search.internal:9200")
///     .basic_auth("indexer", Some("secret"))
///     .timeout(Duration::from_secs(10))
///     .build()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct ElasticsearchStoreBuilder {
    url: String,
    credentials: Option<Credentials>,
    timeout: Option<Duration>,
}

impl ElasticsearchStoreBuilder {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            credentials: None,
            timeout: None,
        }
    }

    /// Reads the connection settings from the environment.
    ///
    /// | Variable | Meaning |
    /// |---|---|
    /// | `ELASTICSEARCH_URI` | server URL, defaults to [`DEFAULT_URL`] |
    /// | `ELASTICSEARCH_USERNAME` | basic auth user |
    /// | `ELASTICSEARCH_PASSWORD` | basic auth password |
    /// | `ELASTICSEARCH_TIMEOUT_SECS` | request timeout in seconds |
    ///
    /// # Errors
    ///
    /// Returns [`IndexStoreError::Initialization`] if the timeout is not a whole number.
    pub fn from_env() -> IndexStoreResult<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> IndexStoreResult<Self> {
        let mut builder = Self::new(
            &lookup("ELASTICSEARCH_URI").unwrap_or_else(|| DEFAULT_URL.to_string()),
        );

        if let Some(username) = lookup("ELASTICSEARCH_USERNAME") {
            builder = builder.basic_auth(username, lookup("ELASTICSEARCH_PASSWORD"));
        }

        if let Some(timeout) = lookup("ELASTICSEARCH_TIMEOUT_SECS") {
            let seconds = timeout
                .trim()
                .parse::<u64>()
                .map_err(|_| IndexStoreError::Initialization(format!("invalid ELASTICSEARCH_TIMEOUT_SECS `{}`", timeout)))?;

            builder = builder.timeout(Duration::from_secs(seconds));
        }

        Ok(builder)
    }

    pub fn basic_auth(mut self, username: impl Into<String>, password: Option<impl Into<String>>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.map(Into::into),
        });
        self
    }

    /// Sets the timeout of each request.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl SearchBackendBuilder for ElasticsearchStoreBuilder {
    type Backend = ElasticsearchStore;

    async fn build(self) -> IndexStoreResult<Self::Backend> {
        let base_url = Url::parse(&self.url)
            .map_err(|e| IndexStoreError::Initialization(format!("invalid URL `{}`: {}", self.url, e)))?;

        if base_url.cannot_be_a_base() {
            return Err(IndexStoreError::Initialization(format!("`{}` cannot be used as a base URL", self.url)));
        }

        let mut client = Client::builder();

        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }

        Ok(ElasticsearchStore {
            client: client
                .build()
                .map_err(|e| IndexStoreError::Initialization(e.to_string()))?,
            base_url,
            credentials: self.credentials,
        })
    }
}
