use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

pub mod config;
pub mod contract;
pub mod error;

pub use config::{BackendConfig, Endpoint, BACKEND_URL_VAR, DEFAULT_BACKEND_URL};
pub use contract::*;
pub use error::{ApiError, ConfigError, ContractError};

/// File name and media type the classifier expects for a region crop.
pub const REGION_FILE_NAME: &str = "region.jpg";
pub const REGION_MIME_TYPE: &str = "image/jpeg";

/// Calls the workbench needs from the image-processing backend.
///
/// Every workflow is generic over this trait so it can run against the HTTP
/// client in production and against a scripted double in tests.
#[allow(async_fn_in_trait)]
pub trait ImageBackend {
    /// `POST /process-image/` with the image and its metadata.
    async fn submit_image(
        &self,
        image: &ImageUpload,
        metadata: &SubmissionMetadata,
    ) -> Result<SubmitResponse, ApiError>;

    /// `GET /estado/{id}`.
    async fn fetch_status(&self, id: &ProcessId) -> Result<ProcessRecord, ApiError>;

    /// `POST /test-image`: locate candidate objects in an image.
    async fn detect_regions(&self, image: &ImageUpload) -> Result<DetectionResponse, ApiError>;

    /// `POST /test-knn-image` with one decoded region crop.
    async fn classify_region(&self, region: Vec<u8>) -> Result<ClassifyResponse, ApiError>;

    /// `GET /grafica-entrenamiento`.
    async fn training_points(&self) -> Result<Vec<TrainingPoint>, ApiError>;
}

/// HTTP client for the image-processing backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    config: BackendConfig,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    /// Use a preconfigured `reqwest` client (timeouts, proxies).
    pub fn with_client(config: BackendConfig, client: Client) -> Self {
        Self { client, config }
    }

    /// Create from the `BACKEND_URL` environment variable
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self::new(BackendConfig::from_env()?))
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn image_part(endpoint: Endpoint, image: &ImageUpload) -> Result<Part, ApiError> {
        let part = Part::bytes(image.bytes.to_vec()).file_name(image.file_name.clone());
        if image.mime_type.is_empty() {
            return Ok(part);
        }
        part.mime_str(&image.mime_type)
            .map_err(|source| ApiError::Transport { endpoint, source })
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        form: Form,
    ) -> Result<T, ApiError> {
        let url = self.config.endpoint_url(endpoint)?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;

        let body = read_body(endpoint, response).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::contract(endpoint, e))
    }

    async fn get_text(&self, endpoint: Endpoint, url: Url) -> Result<String, ApiError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| ApiError::Transport { endpoint, source })?;

        read_body(endpoint, response).await
    }
}

impl ImageBackend for BackendClient {
    async fn submit_image(
        &self,
        image: &ImageUpload,
        metadata: &SubmissionMetadata,
    ) -> Result<SubmitResponse, ApiError> {
        let endpoint = Endpoint::SubmitImage;
        info!(
            "Submitting {} ({} bytes) as class '{}' with threshold {}",
            image.file_name,
            image.len(),
            metadata.class_name(),
            metadata.threshold_value()
        );

        let form = Form::new()
            .part("image", Self::image_part(endpoint, image)?)
            .text("metadata", metadata.to_json());

        self.post_form(endpoint, form).await
    }

    async fn fetch_status(&self, id: &ProcessId) -> Result<ProcessRecord, ApiError> {
        let endpoint = Endpoint::Status;
        let url = self.config.status_url(id)?;

        let body = self.get_text(endpoint, url).await?;
        let record = ProcessRecord::from_json_str(&body).map_err(|e| ApiError::contract(endpoint, e))?;

        info!("Process {} is '{}'", id, record.status);
        Ok(record)
    }

    async fn detect_regions(&self, image: &ImageUpload) -> Result<DetectionResponse, ApiError> {
        let endpoint = Endpoint::DetectRegions;
        info!("Detecting regions in {}", image.file_name);

        let form = Form::new().part("image", Self::image_part(endpoint, image)?);
        let response: DetectionResponse = self.post_form(endpoint, form).await?;

        info!(
            "Backend reported {} regions ({} with details)",
            response.objetos_detectados.regiones,
            response.objetos_detectados.detalles.len()
        );
        Ok(response)
    }

    async fn classify_region(&self, region: Vec<u8>) -> Result<ClassifyResponse, ApiError> {
        let endpoint = Endpoint::ClassifyRegion;
        let upload = ImageUpload::new(REGION_FILE_NAME, REGION_MIME_TYPE, region);

        let form = Form::new().part("file", Self::image_part(endpoint, &upload)?);
        self.post_form(endpoint, form).await
    }

    async fn training_points(&self) -> Result<Vec<TrainingPoint>, ApiError> {
        let endpoint = Endpoint::TrainingData;
        let url = self.config.endpoint_url(endpoint)?;

        let body = self.get_text(endpoint, url).await?;
        let response: TrainingResponse =
            serde_json::from_str(&body).map_err(|e| ApiError::contract(endpoint, e))?;

        info!("Loaded {} training points", response.puntos.len());
        Ok(response.puntos)
    }
}

/// Body text of a successful response, or [`ApiError::Status`] for anything outside 2xx.
async fn read_body(endpoint: Endpoint, response: Response) -> Result<String, ApiError> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|source| ApiError::Transport { endpoint, source })?;

    if !status.is_success() {
        warn!("Backend error on {}: {} - {}", endpoint, status, body);
        return Err(ApiError::Status {
            endpoint,
            status: status.as_u16(),
            body,
        });
    }

    Ok(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn header_end(request: &[u8]) -> Option<usize> {
        request.windows(4).position(|w| w == b"\r\n\r\n")
    }

    fn is_complete(request: &[u8]) -> bool {
        let Some(end) = header_end(request) else {
            return false;
        };
        let head = String::from_utf8_lossy(&request[..end]).to_lowercase();
        if head.contains("transfer-encoding: chunked") {
            return request.ends_with(b"0\r\n\r\n");
        }
        let length = head
            .lines()
            .find_map(|l| l.strip_prefix("content-length:"))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        request.len() >= end + 4 + length
    }

    /// Answer exactly one request and hand back its raw text.
    async fn serve_once(status: &'static str, body: &'static str) -> (BackendClient, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 4096];
            while !is_complete(&request) {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            String::from_utf8_lossy(&request).into_owned()
        });

        let config = BackendConfig::new(&format!("http://{}", addr)).unwrap();
        let client = Client::builder().no_proxy().build().unwrap();
        (BackendClient::with_client(config, client), server)
    }

    #[tokio::test]
    async fn test_submit_sends_image_and_metadata_parts() {
        let (backend, server) = serve_once("200 OK", r#"{"proceso_id": "p-1"}"#).await;
        let image = ImageUpload::new("a.png", "image/png", vec![1, 2, 3]);
        let metadata = SubmissionMetadata::new("manzana", 128).unwrap();

        let response = backend.submit_image(&image, &metadata).await.unwrap();
        assert_eq!(response.accepted_id(), Some(&ProcessId::new("p-1")));

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /process-image/ HTTP/1.1"));
        assert!(request.contains(r#"name="image"; filename="a.png""#));
        assert!(request.contains(r#"name="metadata""#));
        assert!(request.contains(r#"{"class_name":"manzana","threshold_value":128}"#));
    }

    #[tokio::test]
    async fn test_fetch_status_decodes_completed_record() {
        let (backend, server) =
            serve_once("200 OK", r#"{"status": "completado", "compactness_factor": 0.5}"#).await;

        let record = backend.fetch_status(&ProcessId::new("abc")).await.unwrap();
        assert!(record.is_complete());

        let request = server.await.unwrap();
        assert!(request.starts_with("GET /estado/abc HTTP/1.1"));
    }

    #[tokio::test]
    async fn test_classify_region_sends_file_part() {
        let (backend, server) = serve_once("200 OK", r#"{"prediccion_clase": "pera"}"#).await;

        backend.classify_region(vec![0xff, 0xd8]).await.unwrap();

        let request = server.await.unwrap();
        assert!(request.starts_with("POST /test-knn-image HTTP/1.1"));
        assert!(request.contains(r#"name="file"; filename="region.jpg""#));
        assert!(request.contains("image/jpeg"));
    }

    #[tokio::test]
    async fn test_error_status_keeps_body() {
        let (backend, server) = serve_once("500 Internal Server Error", "boom").await;

        let err = backend.training_points().await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Status { endpoint: Endpoint::TrainingData, status: 500, ref body } if body == "boom"
        ));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_malformed_body_is_a_contract_error() {
        let (backend, server) = serve_once("200 OK", "not json").await;

        let err = backend.fetch_status(&ProcessId::new("abc")).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Contract { endpoint: Endpoint::Status, .. }
        ));
        server.await.unwrap();
    }
}
