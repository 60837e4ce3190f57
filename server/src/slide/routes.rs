//! HTTP route handlers for the tile API

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::get,
};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{MirrorDefaults, StorageConfig};

use super::catalog;
use super::details::DetailsReporter;
use super::dicom;
use super::encode::TileEncoder;
use super::macro_image::{MacroExtractor, macro_details};
use super::reader::SlideReader;
use super::region::RegionExtractor;
use super::tile_cache::{MacroCache, TileCache};
use super::types::{
    CaseList, ImageFormat, ImageList, MacroDetails, MacroRequest, RegionRequest, SlideDetails,
    SlideError, validate_path_component,
};

/// Application state shared by the tile API handlers
#[derive(Clone)]
pub struct SlideAppState {
    pub tiles: Arc<TileCache>,
    pub macros: Arc<MacroCache>,
    pub details: DetailsReporter,
    /// Loaded once at startup, never mutated
    pub mirror: Arc<MirrorDefaults>,
    pub slides_dir: PathBuf,
    pub macro_dir: PathBuf,
    pub dicom_dir: PathBuf,
}

impl SlideAppState {
    pub fn new(
        storage: &StorageConfig,
        reader: Arc<dyn SlideReader>,
        mirror: MirrorDefaults,
        jpeg_quality: u8,
    ) -> Self {
        let encoder = TileEncoder::new(jpeg_quality);
        let tiles = TileCache::new(
            &storage.cache_dir,
            &storage.slides_dir,
            RegionExtractor::new(Arc::clone(&reader), encoder),
        );
        let macros = MacroCache::new(
            &storage.macro_cache_dir,
            &storage.macro_dir,
            MacroExtractor::new(encoder),
        );

        Self {
            tiles: Arc::new(tiles),
            macros: Arc::new(macros),
            details: DetailsReporter::new(reader),
            mirror: Arc::new(mirror),
            slides_dir: storage.slides_dir.clone(),
            macro_dir: storage.macro_dir.clone(),
            dicom_dir: storage.dicom_dir.clone(),
        }
    }
}

/// Error response for the tile API
#[derive(Debug, Serialize)]
pub struct SlideErrorResponse {
    pub error: String,
    pub code: String,
}

impl From<SlideError> for SlideErrorResponse {
    fn from(e: SlideError) -> Self {
        let code = match &e {
            SlideError::NotFound(_) => "not_found",
            SlideError::OpenError(_) => "open_error",
            SlideError::DecodeError(_) => "decode_error",
            SlideError::EncodeError(_) => "encode_error",
            SlideError::InvalidParameter(_) => "invalid_parameter",
            SlideError::IoError(_) => "io_error",
        };
        Self {
            error: e.to_string(),
            code: code.to_string(),
        }
    }
}

impl IntoResponse for SlideErrorResponse {
    fn into_response(self) -> Response {
        let status = match self.code.as_str() {
            "not_found" | "open_error" | "decode_error" => StatusCode::NOT_FOUND,
            "invalid_parameter" => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(self)).into_response()
    }
}

/// Query for `/image`
#[derive(Debug, Deserialize)]
pub struct ImageQuery {
    #[serde(rename = "caseID")]
    pub case_id: String,
    pub name: String,
    pub level: i32,
    pub x: i64,
    pub y: i64,
    pub w: i32,
    pub h: i32,
    pub format: Option<String>,
    pub mirror: Option<String>,
}

/// Query for `/macro`; `x` and `y` are level 0 coordinates
#[derive(Debug, Deserialize)]
pub struct MacroQuery {
    #[serde(rename = "caseID")]
    pub case_id: String,
    pub name: String,
    pub level: i32,
    pub x: i64,
    pub y: i64,
    pub w: i32,
    pub h: i32,
    pub format: Option<String>,
}

/// Query naming one image of a case
#[derive(Debug, Deserialize)]
pub struct ImageRef {
    #[serde(rename = "caseID")]
    pub case_id: String,
    pub name: String,
}

/// Query naming one DICOM study
#[derive(Debug, Deserialize)]
pub struct StudyRef {
    pub name: String,
}

/// Query naming one case
#[derive(Debug, Deserialize)]
pub struct CaseRef {
    #[serde(rename = "caseID")]
    pub case_id: String,
}

fn parse_format(format: Option<&str>) -> Result<ImageFormat, SlideError> {
    format.map_or(Ok(ImageFormat::default()), |f| f.parse())
}

fn parse_mirror(mirror: Option<&str>) -> Result<bool, SlideError> {
    match mirror.map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("true") => Ok(true),
        Some("false") => Ok(false),
        Some(other) => Err(SlideError::InvalidParameter(format!(
            "mirror must be true or false, got {:?}",
            other
        ))),
    }
}

fn image_response(format: ImageFormat, bytes: Bytes) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, format.content_type()),
            (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
        ],
        bytes,
    )
        .into_response()
}

/// Run blocking filesystem or decode work off the async runtime
async fn blocking<T, F>(f: F) -> Result<T, SlideError>
where
    F: FnOnce() -> Result<T, SlideError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SlideError::IoError(std::io::Error::other(e)))?
}

/// GET /image - Get a tile, decoding it on a cache miss
pub async fn get_image(
    State(state): State<SlideAppState>,
    Query(query): Query<ImageQuery>,
) -> Result<Response, SlideErrorResponse> {
    let format = parse_format(query.format.as_deref())?;
    let mirror = state
        .mirror
        .resolve(&query.name, parse_mirror(query.mirror.as_deref())?);

    let request = RegionRequest::new(
        &query.case_id,
        &query.name,
        query.level,
        query.x,
        query.y,
        query.w,
        query.h,
        format,
        mirror,
    )
    .map_err(|e| {
        debug!("Rejected image request {:?}: {}", query, e);
        SlideErrorResponse::from(e)
    })?;

    debug!(
        "Image: {} level={} x={} y={} w={} h={} format={} mirror={}",
        request.image_name,
        request.level,
        request.x,
        request.y,
        request.w,
        request.h,
        request.format,
        request.mirror
    );

    match state.tiles.get_or_create(&request).await {
        Some(bytes) => Ok(image_response(request.format, bytes)),
        None => Err(SlideError::NotFound(format!(
            "{}/{} level={} x={} y={}",
            request.case_id, request.image_name, request.level, request.x, request.y
        ))
        .into()),
    }
}

/// GET /macro - Get a crop of a pre-rendered overview image
pub async fn get_macro(
    State(state): State<SlideAppState>,
    Query(query): Query<MacroQuery>,
) -> Result<Response, SlideErrorResponse> {
    let format = parse_format(query.format.as_deref())?;
    let request = MacroRequest::from_level0(
        &query.case_id,
        &query.name,
        query.level,
        query.x,
        query.y,
        query.w,
        query.h,
        format,
    )?;

    debug!(
        "Macro: {} level={} x={} y={} w={} h={}",
        request.image_name, request.level, request.x, request.y, request.w, request.h
    );

    match state.macros.get_or_create(&request).await {
        Some(bytes) => Ok(image_response(request.format, bytes)),
        None => Err(SlideError::NotFound(format!(
            "macro {}/{} level={}",
            request.case_id, request.image_name, request.level
        ))
        .into()),
    }
}

/// GET /details - Slide metadata
pub async fn get_details(
    State(state): State<SlideAppState>,
    Query(query): Query<ImageRef>,
) -> Result<Json<SlideDetails>, SlideErrorResponse> {
    validate_path_component("caseID", &query.case_id)?;
    validate_path_component("name", &query.name)?;

    let path = state.slides_dir.join(&query.case_id).join(&query.name);
    let reporter = state.details.clone();
    let details = blocking(move || reporter.details(&path)).await.map_err(|e| {
        tracing::warn!("Failed to get details for {}: {}", query.name, e);
        SlideErrorResponse::from(e)
    })?;

    Ok(Json(details))
}

/// GET /macro_details - Macro image size
pub async fn get_macro_details(
    State(state): State<SlideAppState>,
    Query(query): Query<ImageRef>,
) -> Result<Json<MacroDetails>, SlideErrorResponse> {
    validate_path_component("caseID", &query.case_id)?;
    validate_path_component("name", &query.name)?;

    let path = state.macro_dir.join(&query.case_id).join(&query.name);
    let details = blocking(move || macro_details(&path)).await?;
    Ok(Json(details))
}

/// GET /cases - Case directories under the slide root
pub async fn get_cases(
    State(state): State<SlideAppState>,
) -> Result<Json<CaseList>, SlideErrorResponse> {
    let root = state.slides_dir.clone();
    Ok(Json(blocking(move || catalog::list_cases(&root)).await?))
}

/// GET /list - Slides of one case
pub async fn get_list(
    State(state): State<SlideAppState>,
    Query(query): Query<CaseRef>,
) -> Result<Json<ImageList>, SlideErrorResponse> {
    let root = state.slides_dir.clone();
    Ok(Json(
        blocking(move || catalog::list_images(&root, &query.case_id)).await?,
    ))
}

/// GET /macro_cases - Case directories under the macro root
pub async fn get_macro_cases(
    State(state): State<SlideAppState>,
) -> Result<Json<CaseList>, SlideErrorResponse> {
    let root = state.macro_dir.clone();
    Ok(Json(blocking(move || catalog::list_cases(&root)).await?))
}

/// GET /macro_list - Macro images of one case
pub async fn get_macro_list(
    State(state): State<SlideAppState>,
    Query(query): Query<CaseRef>,
) -> Result<Json<ImageList>, SlideErrorResponse> {
    let root = state.macro_dir.clone();
    Ok(Json(
        blocking(move || catalog::list_images(&root, &query.case_id)).await?,
    ))
}

/// GET /dicom - Rendered JPEG frame of an exported study
pub async fn get_dicom(
    State(state): State<SlideAppState>,
    Query(query): Query<StudyRef>,
) -> Result<Response, SlideErrorResponse> {
    let path = dicom::image_path(&state.dicom_dir, &query.name)?;
    let bytes = blocking(move || dicom::load(&path)).await?;
    Ok(image_response(ImageFormat::Jpg, Bytes::from(bytes)))
}

/// GET /dicom_list - Exported studies
pub async fn get_dicom_list(
    State(state): State<SlideAppState>,
) -> Result<Json<CaseList>, SlideErrorResponse> {
    let root = state.dicom_dir.clone();
    Ok(Json(blocking(move || dicom::list_studies(&root)).await?))
}

/// GET /dicom_details - Exported metadata document, served verbatim
pub async fn get_dicom_details(
    State(state): State<SlideAppState>,
    Query(query): Query<StudyRef>,
) -> Result<Response, SlideErrorResponse> {
    let path = dicom::details_path(&state.dicom_dir, &query.name)?;
    let bytes = blocking(move || dicom::load(&path)).await?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        bytes,
    )
        .into_response())
}

/// Commands accepted by the single-endpoint `?command=` interface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Image,
    Macro,
    Details,
    MacroDetails,
    Cases,
    List,
    MacroCases,
    MacroList,
    Dicom,
    DicomList,
    DicomDetails,
}

#[derive(Debug, Deserialize)]
struct CommandQuery {
    command: Command,
}

async fn with_query<Q, F, Fut, R>(uri: &Uri, handler: F) -> Response
where
    Q: DeserializeOwned,
    F: FnOnce(Query<Q>) -> Fut,
    Fut: Future<Output = R>,
    R: IntoResponse,
{
    match Query::<Q>::try_from_uri(uri) {
        Ok(query) => handler(query).await.into_response(),
        Err(rejection) => rejection.into_response(),
    }
}

/// GET /?command=... - Dispatch to the handler registered for `command`
pub async fn dispatch_command(State(state): State<SlideAppState>, uri: Uri) -> Response {
    let command = match Query::<CommandQuery>::try_from_uri(&uri) {
        Ok(Query(query)) => query.command,
        Err(rejection) => {
            debug!("Rejected command request {}: {}", uri, rejection);
            return SlideErrorResponse::from(SlideError::InvalidParameter(
                "missing or unknown command".to_string(),
            ))
            .into_response();
        }
    };

    let state = State(state);
    match command {
        Command::Image => with_query(&uri, |q| get_image(state, q)).await,
        Command::Macro => with_query(&uri, |q| get_macro(state, q)).await,
        Command::Details => with_query(&uri, |q| get_details(state, q)).await,
        Command::MacroDetails => with_query(&uri, |q| get_macro_details(state, q)).await,
        Command::Cases => get_cases(state).await.into_response(),
        Command::List => with_query(&uri, |q| get_list(state, q)).await,
        Command::MacroCases => get_macro_cases(state).await.into_response(),
        Command::MacroList => with_query(&uri, |q| get_macro_list(state, q)).await,
        Command::Dicom => with_query(&uri, |q| get_dicom(state, q)).await,
        Command::DicomList => get_dicom_list(state).await.into_response(),
        Command::DicomDetails => with_query(&uri, |q| get_dicom_details(state, q)).await,
    }
}

/// Build tile API routes
pub fn slide_routes(state: SlideAppState) -> Router {
    Router::new()
        .route("/image", get(get_image))
        .route("/macro", get(get_macro))
        .route("/details", get(get_details))
        .route("/macro_details", get(get_macro_details))
        .route("/cases", get(get_cases))
        .route("/list", get(get_list))
        .route("/macro_cases", get(get_macro_cases))
        .route("/macro_list", get(get_macro_list))
        .route("/dicom", get(get_dicom))
        .route("/dicom_list", get(get_dicom_list))
        .route("/dicom_details", get(get_dicom_details))
        .with_state(state)
}

/// Build the `?command=` compatibility route
pub fn command_routes(state: SlideAppState) -> Router {
    Router::new()
        .route("/", get(dispatch_command))
        .with_state(state)
}
