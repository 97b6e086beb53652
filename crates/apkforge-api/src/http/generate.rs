//! `POST /generate-app`: multipart intake and build dispatch.

use std::sync::Arc;

use apkforge_workspace::{BuildFields, BuildRequest, StagedUpload, release_all};
use axum::{
    Json,
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError, MultipartRejection},
    },
    http::StatusCode,
};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

use crate::http::constants::{
    FIELD_APP_NAME, FIELD_HTML_FILE, FIELD_ICON, FIELD_PACKAGE_NAME, FIELD_URL, FIELD_VERSION,
};
use crate::http::errors::ApiError;
use crate::models::GenerateAppResponse;
use crate::state::ApiState;

/// Multipart fields collected before validation.
#[derive(Debug, Default)]
struct GenerateForm {
    app_name: Option<String>,
    package_name: Option<String>,
    version: Option<String>,
    url: Option<String>,
    icon: Option<StagedUpload>,
    html_file: Option<StagedUpload>,
}

impl GenerateForm {
    /// Validate the required text fields, returning the form untouched on failure.
    fn into_request(self) -> Result<BuildRequest, Self> {
        let complete = [&self.package_name, &self.app_name, &self.version, &self.url]
            .into_iter()
            .all(|value| value.as_deref().is_some_and(|value| !value.is_empty()));
        if !complete {
            return Err(self);
        }
        let Self {
            app_name,
            package_name,
            version,
            url,
            icon,
            html_file,
        } = self;
        Ok(BuildRequest {
            fields: BuildFields {
                package_name: package_name.unwrap_or_default(),
                app_name: app_name.unwrap_or_default(),
                version: version.unwrap_or_default(),
                url: url.unwrap_or_default(),
            },
            icon,
            web_content: html_file,
        })
    }

    async fn release(self) {
        release_all(self.icon.into_iter().chain(self.html_file)).await;
    }
}

pub(crate) async fn generate_app(
    State(state): State<Arc<ApiState>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerateAppResponse>, ApiError> {
    let mut multipart = multipart.map_err(|rejection| {
        warn!(error = %rejection, "rejected non-multipart generate request");
        ApiError::invalid_multipart()
    })?;

    let mut form = GenerateForm::default();
    if let Err(err) = read_form(&state, &mut multipart, &mut form).await {
        form.release().await;
        return Err(err);
    }

    let request = match form.into_request() {
        Ok(request) => request,
        Err(form) => {
            form.release().await;
            return Err(ApiError::missing_fields());
        }
    };

    match state.service.generate(request).await {
        Ok(receipt) => Ok(Json(GenerateAppResponse {
            success: true,
            apk_path: receipt.artifact_path.display().to_string(),
            download_url: receipt.download_url(),
        })),
        // The pipeline has already logged the failure detail.
        Err(_) => Err(ApiError::generate_failed()),
    }
}

async fn read_form(
    state: &ApiState,
    multipart: &mut Multipart,
    form: &mut GenerateForm,
) -> Result<(), ApiError> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            FIELD_APP_NAME => form.app_name = Some(field.text().await.map_err(multipart_error)?),
            FIELD_PACKAGE_NAME => {
                form.package_name = Some(field.text().await.map_err(multipart_error)?);
            }
            FIELD_VERSION => form.version = Some(field.text().await.map_err(multipart_error)?),
            FIELD_URL => form.url = Some(field.text().await.map_err(multipart_error)?),
            FIELD_ICON => stage_field(state, field, &mut form.icon).await?,
            FIELD_HTML_FILE => stage_field(state, field, &mut form.html_file).await?,
            other => debug!(field = other, "ignoring unknown multipart field"),
        }
    }
    Ok(())
}

/// Stream one file field to a fresh staging location held in `slot`.
async fn stage_field(
    state: &ApiState,
    mut field: Field<'_>,
    slot: &mut Option<StagedUpload>,
) -> Result<(), ApiError> {
    if slot.is_some() {
        warn!(field = field.name().unwrap_or_default(), "repeated file field");
        return Err(ApiError::duplicate_file());
    }
    let staged = state
        .service
        .stage_upload(field.file_name())
        .await
        .map_err(|err| {
            error!(error = ?err, "failed to stage upload");
            ApiError::internal()
        })?;
    let path = staged.path().to_path_buf();
    *slot = Some(staged);

    let mut file = File::create(&path).await.map_err(|err| {
        error!(error = %err, path = %path.display(), "failed to create staged upload");
        ApiError::internal()
    })?;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        file.write_all(&chunk).await.map_err(|err| {
            error!(error = %err, path = %path.display(), "failed to write staged upload");
            ApiError::internal()
        })?;
    }
    file.flush().await.map_err(|err| {
        error!(error = %err, path = %path.display(), "failed to flush staged upload");
        ApiError::internal()
    })?;
    Ok(())
}

fn multipart_error(err: MultipartError) -> ApiError {
    warn!(error = %err, "malformed multipart body");
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::upload_too_large()
    } else {
        ApiError::invalid_multipart()
    }
}
