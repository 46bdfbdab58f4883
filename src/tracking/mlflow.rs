//! MLflow REST client (API 2.0).
//!
//! Works against a self-hosted tracking server or a hosted one such as
//! DagsHub. Artifacts go through the server's `mlflow-artifacts` proxy.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};
use url::Url;
use zeroize::Zeroizing;

use super::{ExperimentTracker, RunStatus, TrackingRun};
use crate::config::TrackingConfig;
use crate::error::{NetGuardError, Result};

const DEFAULT_EXPERIMENT_ID: &str = "0";
const PROXY_SCHEME: &str = "mlflow-artifacts:";

enum Auth {
    None,
    Basic {
        username: String,
        password: Zeroizing<String>,
    },
    Bearer(Zeroizing<String>),
}

impl fmt::Debug for Auth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Auth::None => write!(f, "None"),
            Auth::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Auth::Bearer(_) => write!(f, "Bearer(***)"),
        }
    }
}

#[derive(Serialize)]
struct CreateRunRequest<'a> {
    experiment_id: &'a str,
    start_time: i64,
}

#[derive(Deserialize)]
struct CreateRunResponse {
    run: RunPayload,
}

#[derive(Deserialize)]
struct RunPayload {
    info: RunInfo,
}

#[derive(Deserialize)]
struct RunInfo {
    run_id: String,
    #[serde(default)]
    artifact_uri: Option<String>,
}

#[derive(Serialize)]
struct LogMetricRequest<'a> {
    run_id: &'a str,
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: i64,
}

#[derive(Serialize)]
struct UpdateRunRequest<'a> {
    run_id: &'a str,
    status: RunStatus,
    end_time: i64,
}

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentInfo,
}

#[derive(Deserialize)]
struct ExperimentInfo {
    experiment_id: String,
}

#[derive(Serialize)]
struct CreateExperimentRequest<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

/// Tracker backed by an MLflow tracking server
#[derive(Debug)]
pub struct MlflowTracker {
    client: Client,
    base_url: Url,
    auth: Auth,
    experiment_name: Option<String>,
    experiment_id: OnceCell<String>,
}

impl MlflowTracker {
    pub fn from_config(config: &TrackingConfig) -> Result<Self> {
        let uri = config.uri.as_deref().ok_or_else(|| {
            NetGuardError::Validation("tracking.uri is required for MLflow tracking".to_string())
        })?;
        let base_url = Url::parse(uri)
            .map_err(|e| NetGuardError::Validation(format!("invalid tracking uri {uri}: {e}")))?;

        let auth = match (&config.token, &config.username, &config.password) {
            (Some(token), _, _) => Auth::Bearer(Zeroizing::new(token.clone())),
            (None, Some(username), Some(password)) => Auth::Basic {
                username: username.clone(),
                password: Zeroizing::new(password.clone()),
            },
            _ => Auth::None,
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        info!("MLflow tracking enabled: {}", base_url);
        Ok(Self {
            client,
            base_url,
            auth,
            experiment_name: config.experiment_name.clone(),
            experiment_id: OnceCell::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NetGuardError::Validation(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "2.0", "mlflow"])
            .extend(path.split('/'));
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.auth {
            Auth::None => request,
            Auth::Basic { username, password } => {
                request.basic_auth(username, Some(password.as_str()))
            }
            Auth::Bearer(token) => request.bearer_auth(token.as_str()),
        }
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Response> {
        let url = self.endpoint(path)?;
        debug!("POST {}", url);
        let response = self
            .authorize(self.client.post(url))
            .json(body)
            .send()
            .await?;
        check_status(response).await
    }

    async fn experiment_id(&self) -> Result<&str> {
        let id = self
            .experiment_id
            .get_or_try_init(|| async {
                match &self.experiment_name {
                    Some(name) => self.resolve_experiment(name).await,
                    None => Ok(DEFAULT_EXPERIMENT_ID.to_string()),
                }
            })
            .await?;
        Ok(id.as_str())
    }

    async fn resolve_experiment(&self, name: &str) -> Result<String> {
        let mut url = self.endpoint("experiments/get-by-name")?;
        url.query_pairs_mut().append_pair("experiment_name", name);
        let response = self.authorize(self.client.get(url)).send().await?;

        if response.status() == StatusCode::NOT_FOUND {
            info!("creating MLflow experiment '{}'", name);
            let created: CreateExperimentResponse = self
                .post("experiments/create", &CreateExperimentRequest { name })
                .await?
                .json()
                .await?;
            return Ok(created.experiment_id);
        }

        let found: GetExperimentResponse = check_status(response).await?.json().await?;
        debug!("experiment '{}' has id {}", name, found.experiment.experiment_id);
        Ok(found.experiment.experiment_id)
    }

    fn artifact_url(
        &self,
        run: &TrackingRun,
        experiment_id: &str,
        artifact_path: &str,
        file_name: &str,
    ) -> Result<Url> {
        let root = proxied_artifact_root(run.artifact_uri.as_deref())
            .unwrap_or_else(|| format!("{}/{}/artifacts", experiment_id, run.run_id));

        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NetGuardError::Validation(format!("{} cannot be a base", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "2.0", "mlflow-artifacts", "artifacts"])
            .extend(root.split('/').filter(|s| !s.is_empty()))
            .extend(artifact_path.split('/').filter(|s| !s.is_empty()))
            .push(file_name);
        Ok(url)
    }
}

/// Path of a run's artifact root relative to the artifact proxy.
///
/// `mlflow-artifacts:/1/abc/artifacts` and
/// `mlflow-artifacts://host:5000/1/abc/artifacts` both give `1/abc/artifacts`.
fn proxied_artifact_root(artifact_uri: Option<&str>) -> Option<String> {
    let rest = artifact_uri?.strip_prefix(PROXY_SCHEME)?;
    let path = match rest.strip_prefix("//") {
        Some(with_authority) => with_authority.split_once('/').map_or("", |(_, p)| p),
        None => rest,
    };
    Some(path.trim_matches('/').to_string())
}

async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(NetGuardError::Tracking {
        status: status.as_u16(),
        body,
    })
}

#[async_trait]
impl ExperimentTracker for MlflowTracker {
    async fn start_run(&self) -> Result<TrackingRun> {
        let experiment_id = self.experiment_id().await?;
        let request = CreateRunRequest {
            experiment_id,
            start_time: Utc::now().timestamp_millis(),
        };
        let created: CreateRunResponse = self.post("runs/create", &request).await?.json().await?;

        info!("started MLflow run {}", created.run.info.run_id);
        Ok(TrackingRun {
            run_id: created.run.info.run_id,
            artifact_uri: created.run.info.artifact_uri,
        })
    }

    async fn log_metric(&self, run: &TrackingRun, key: &str, value: f64) -> Result<()> {
        let request = LogMetricRequest {
            run_id: &run.run_id,
            key,
            value,
            timestamp: Utc::now().timestamp_millis(),
            step: 0,
        };
        self.post("runs/log-metric", &request).await?;
        debug!("run {}: {}={}", run.run_id, key, value);
        Ok(())
    }

    async fn log_artifact(
        &self,
        run: &TrackingRun,
        local_path: &Path,
        artifact_path: &str,
    ) -> Result<()> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                NetGuardError::Validation(format!(
                    "artifact path has no file name: {}",
                    local_path.display()
                ))
            })?;
        let bytes = tokio::fs::read(local_path)
            .await
            .map_err(|e| NetGuardError::file(local_path, e))?;

        let experiment_id = self.experiment_id().await?;
        let url = self.artifact_url(run, experiment_id, artifact_path, file_name)?;
        debug!("PUT {} ({} bytes)", url, bytes.len());
        let response = self
            .authorize(self.client.put(url))
            .body(bytes)
            .send()
            .await?;
        check_status(response).await?;

        info!("run {}: uploaded {}/{}", run.run_id, artifact_path, file_name);
        Ok(())
    }

    async fn end_run(&self, run: &TrackingRun, status: RunStatus) -> Result<()> {
        let request = UpdateRunRequest {
            run_id: &run.run_id,
            status,
            end_time: Utc::now().timestamp_millis(),
        };
        self.post("runs/update", &request).await?;
        info!("MLflow run {} {}", run.run_id, status);
        Ok(())
    }
}
