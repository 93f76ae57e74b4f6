//! API-Gateway proxy adapter for serverless deployments.
//!
//! Events arrive through the Lambda runtime API ([`LambdaAdapter::run`]). Each
//! proxy event becomes one neutral request. Bodies are always returned
//! base64-encoded since they are usually binary images.

use aws_lambda_events::apigw::{ApiGatewayProxyRequest, ApiGatewayProxyResponse};
use aws_lambda_events::encodings::Body;
use http::Method;
use lambda_runtime::{service_fn, LambdaEvent};
use tracing::{debug, info};

use super::handlers::referer_from;
use crate::service::{ImageHandler, ImageRequest};

/// Adapter translating proxy events to neutral requests.
pub struct LambdaAdapter<H> {
    handler: H,
    url_prefix: String,
}

impl<H: ImageHandler> LambdaAdapter<H> {
    /// Requests outside `/<route_prefix>/` are answered with a bare 400.
    pub fn new(handler: H, route_prefix: &str) -> Self {
        Self {
            handler,
            url_prefix: format!("/{}/", route_prefix),
        }
    }

    /// Poll the Lambda runtime API and answer events until the runtime stops.
    pub async fn run(self) -> Result<(), lambda_runtime::Error> {
        let adapter = &self;
        lambda_runtime::run(service_fn(move |event| adapter.invoke(event))).await
    }

    /// Handle one runtime invocation.
    pub async fn invoke(
        &self,
        event: LambdaEvent<ApiGatewayProxyRequest>,
    ) -> Result<ApiGatewayProxyResponse, lambda_runtime::Error> {
        debug!("Lambda invocation {}", event.context.request_id);
        Ok(self.handle_event(event.payload).await)
    }

    /// Handle one proxy event.
    pub async fn handle_event(&self, event: ApiGatewayProxyRequest) -> ApiGatewayProxyResponse {
        let path = event.path.clone().unwrap_or_default();
        info!("Lambda event: {} '{}'", event.http_method, path);

        let mut response = ApiGatewayProxyResponse::default();

        if !path.starts_with(&self.url_prefix) {
            response.status_code = 400;
            return response;
        }

        let method = if event.http_method == Method::HEAD {
            Method::HEAD
        } else {
            Method::GET
        };
        let request = ImageRequest::new(method, path).with_referer(referer_from(&event.headers));

        let (status, headers, body) = self.handler.handle(request).await.into_parts();

        response.status_code = i64::from(status.as_u16());
        response.headers = headers;
        response.is_base64_encoded = true;
        response.body = Some(Body::Binary(body.to_vec()));
        response
    }
}
