//! Round trips to the server and status-to-error mapping.
//!
//! Every entity (database, document, attachment, view) builds its own
//! [`HttpRequest`] and hands it to [`Remote::send`] together with a rule
//! table. The first rule matching the response status decides the error
//! message; statuses without a rule get a generic description of the
//! failed request.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult, ErrorKind};
use crate::http::HttpClient;
use serde::de::DeserializeOwned;
use sofa_protocol::{HttpRequest, HttpResponse, Method};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maps one HTTP status to an error message template.
///
/// Templates may reference `{id}`, `{rev}`, `{db}`, `{endpoint}` and any
/// other name the caller puts into the [`ErrorContext`].
#[derive(Debug, Clone, Copy)]
pub(crate) struct ErrorRule {
    status: u16,
    message: &'static str,
    kind: Option<ErrorKind>,
}

impl ErrorRule {
    /// A rule raising the error kind the status maps to.
    pub(crate) const fn new(status: u16, message: &'static str) -> Self {
        Self {
            status,
            message,
            kind: None,
        }
    }

    /// A rule raising `kind` regardless of the status.
    pub(crate) const fn with_kind(status: u16, message: &'static str, kind: ErrorKind) -> Self {
        Self {
            status,
            message,
            kind: Some(kind),
        }
    }

    fn raise(&self, context: &ErrorContext) -> ClientError {
        let message = context.render(self.message);
        match self.kind {
            Some(kind) => kind.into_error(message),
            None => ClientError::from_status(self.status, message),
        }
    }
}

/// Values substituted into error message templates.
#[derive(Debug, Clone, Default)]
pub(crate) struct ErrorContext {
    values: Vec<(&'static str, String)>,
}

impl ErrorContext {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.push((name, value.into()));
        self
    }

    fn render(&self, template: &str) -> String {
        let mut message = template.to_string();
        for (name, value) in &self.values {
            message = message.replace(&format!("{{{}}}", name), value);
        }
        message
    }
}

/// Shared connection state: configuration plus the transport.
pub(crate) struct Remote {
    config: ClientConfig,
    client: Arc<dyn HttpClient>,
}

impl Remote {
    pub(crate) fn new(config: ClientConfig, client: Arc<dyn HttpClient>) -> Self {
        Self { config, client }
    }

    pub(crate) fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Performs one round trip. Non-success statuses become errors.
    pub(crate) async fn send(
        &self,
        request: HttpRequest,
        context: &ErrorContext,
        rules: &[ErrorRule],
    ) -> ClientResult<HttpResponse> {
        let request = request.with_credentials(self.config.credentials.clone());
        let method = request.method;
        let path = request.path();

        let response = self.client.send(request).await.map_err(|e| {
            warn!(%method, %path, error = %e, "request failed");
            ClientError::Transport(format!("{} {}: {}", method, path, e))
        })?;
        debug!(%method, %path, status = response.status, "round trip");

        if response.is_success() {
            Ok(response)
        } else {
            Err(raise(method, &path, &response, context, rules))
        }
    }

    /// Performs one round trip and decodes the JSON body.
    pub(crate) async fn json<T: DeserializeOwned>(
        &self,
        request: HttpRequest,
        context: &ErrorContext,
        rules: &[ErrorRule],
    ) -> ClientResult<T> {
        let response = self.send(request, context, rules).await?;
        Ok(response.decode()?)
    }

    /// Performs a round trip where a not-found answer means `false`.
    pub(crate) async fn exists(
        &self,
        request: HttpRequest,
        context: &ErrorContext,
        rules: &[ErrorRule],
    ) -> ClientResult<bool> {
        match self.send(request, context, rules).await {
            Ok(_) => Ok(true),
            Err(ClientError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl fmt::Debug for Remote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Remote")
            .field("server_url", &self.config.server_url)
            .finish()
    }
}

fn raise(
    method: Method,
    path: &str,
    response: &HttpResponse,
    context: &ErrorContext,
    rules: &[ErrorRule],
) -> ClientError {
    if let Some(rule) = rules.iter().find(|r| r.status == response.status) {
        return rule.raise(context);
    }

    let detail = response
        .error_reason()
        .map(|reason| format!(": {}", reason))
        .unwrap_or_default();
    ClientError::from_status(
        response.status,
        format!(
            "The request ({} {}) returned an error '{}' ({}){}",
            method, path, response.reason, response.status, detail
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::LoopbackClient;
    use serde_json::json;
    use sofa_protocol::LoopbackServer;

    struct FixedServer(u16);

    impl LoopbackServer for FixedServer {
        fn handle(&self, _request: &HttpRequest) -> HttpResponse {
            HttpResponse::json(
                self.0,
                &json!({"error": "failure", "reason": "the server said no"}),
            )
        }
    }

    fn remote(status: u16) -> Remote {
        Remote::new(
            ClientConfig::default(),
            Arc::new(LoopbackClient::new(Arc::new(FixedServer(status)))),
        )
    }

    const RULES: &[ErrorRule] = &[
        ErrorRule::new(404, "Document '{id}' was not found in '{db}'"),
        ErrorRule::with_kind(500, "Not an admin of '{db}'", ErrorKind::Forbidden),
    ];

    fn context() -> ErrorContext {
        ErrorContext::new().with("id", "foo").with("db", "bar")
    }

    #[tokio::test]
    async fn rule_message_is_rendered() {
        let err = remote(404)
            .send(HttpRequest::new(Method::Get, ["bar", "foo"]), &context(), RULES)
            .await
            .unwrap_err();

        match err {
            ClientError::NotFound(message) => {
                assert_eq!(message, "Document 'foo' was not found in 'bar'")
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn rule_kind_overrides_status() {
        let err = remote(500)
            .send(HttpRequest::new(Method::Put, ["bar", "_security"]), &context(), RULES)
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::Forbidden(ref m) if m == "Not an admin of 'bar'"));
    }

    #[tokio::test]
    async fn unmatched_status_gets_generic_message() {
        let err = remote(409)
            .send(HttpRequest::new(Method::Put, ["bar", "foo"]), &context(), RULES)
            .await
            .unwrap_err();

        match err {
            ClientError::Conflict(message) => assert_eq!(
                message,
                "The request (PUT /bar/foo) returned an error 'Conflict' (409): the server said no"
            ),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn exists_maps_not_found_to_false() {
        let found = remote(404)
            .exists(HttpRequest::new(Method::Head, ["bar"]), &context(), &[])
            .await
            .unwrap();
        assert!(!found);

        let result = remote(401)
            .exists(HttpRequest::new(Method::Head, ["bar"]), &context(), &[])
            .await;
        assert!(matches!(result, Err(ClientError::Unauthorized(_))));
    }
}
