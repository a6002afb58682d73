//! HTTP clients for the learning-platform API, plus in-memory stand-ins
//! for tests and prototyping.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, RequestBuilder, StatusCode};

use course_core::model::{CourseId, CourseModules, ModuleIndex, ProgressRecord, UserId};
use storage::repository::{ProgressKey, ProgressWrite, RemoteProgressStore, StorageError};

use crate::config::ApiConfig;
use crate::error::CatalogError;

mod dto;

use dto::{
    CourseEnvelope, EnrollmentListEnvelope, ProgressEnvelope, ProgressListEnvelope,
    SubmitProgressDto,
};

//
// ─── REMOTE PROGRESS CLIENT ────────────────────────────────────────────────────
//

/// `RemoteProgressStore` backed by the platform's progress endpoints.
#[derive(Clone)]
pub struct ProgressApiClient {
    client: Client,
    config: ApiConfig,
}

impl ProgressApiClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn http_err(err: reqwest::Error) -> StorageError {
    StorageError::Connection(err.to_string())
}

fn status_err(what: &str, status: StatusCode) -> StorageError {
    StorageError::Connection(format!("{what} failed with status {status}"))
}

#[async_trait]
impl RemoteProgressStore for ProgressApiClient {
    async fn fetch_all(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<Vec<(ModuleIndex, ProgressRecord)>, StorageError> {
        let url = self.url(&format!("api/progress/{user_id}/{course_id}"));
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(http_err)?;
        if !response.status().is_success() {
            return Err(status_err("progress fetch", response.status()));
        }
        let body: ProgressListEnvelope = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;

        let fallback = Utc::now();
        let mut records: Vec<_> = body
            .progress
            .into_iter()
            .filter_map(|dto| dto.into_record(fallback))
            .collect();
        records.sort_by_key(|(index, _)| *index);
        Ok(records)
    }

    async fn fetch_one(&self, key: &ProgressKey) -> Result<Option<ProgressRecord>, StorageError> {
        let url = self.url(&format!(
            "api/progress/{}/{}/{}",
            key.user_id, key.course_id, key.module_index
        ));
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(http_err)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_err("progress fetch", response.status()));
        }
        let body: ProgressEnvelope = response
            .json()
            .await
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(body.progress.into_record(Utc::now()).map(|(_, record)| record))
    }

    async fn submit(&self, write: &ProgressWrite) -> Result<(), StorageError> {
        let url = self.url("api/progress");
        let response = self
            .authorize(self.client.post(url))
            .json(&SubmitProgressDto::from_write(write))
            .send()
            .await
            .map_err(http_err)?;
        if !response.status().is_success() {
            return Err(status_err("progress submit", response.status()));
        }
        Ok(())
    }
}

//
// ─── COURSE CATALOG ────────────────────────────────────────────────────────────
//

/// Read-only view of course authoring and enrollment.
///
/// Consumed once per player load; everything else in the core works off
/// the module list this hands back.
#[async_trait]
pub trait CourseCatalog: Send + Sync {
    /// Fetch the ordered module list of a course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::CourseNotFound` for an unknown course, or
    /// other catalog errors.
    async fn course_modules(&self, course_id: &CourseId) -> Result<CourseModules, CatalogError>;

    /// Whether the user is enrolled in the course.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError` if enrollment cannot be determined.
    async fn is_enrolled(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<bool, CatalogError>;
}

/// `CourseCatalog` backed by the platform's course and enrollment
/// endpoints.
#[derive(Clone)]
pub struct CourseApiClient {
    client: Client,
    config: ApiConfig,
}

impl CourseApiClient {
    #[must_use]
    pub fn new(config: ApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.config.base_url.trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CourseCatalog for CourseApiClient {
    async fn course_modules(&self, course_id: &CourseId) -> Result<CourseModules, CatalogError> {
        let url = self.url(&format!("api/courses/{course_id}"));
        let response = self.authorize(self.client.get(url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(CatalogError::CourseNotFound);
        }
        if !response.status().is_success() {
            return Err(CatalogError::HttpStatus(response.status()));
        }
        let body: CourseEnvelope = response.json().await?;

        let mut descriptors = Vec::with_capacity(body.course.modules.len());
        for (order, dto) in body.course.modules.into_iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            descriptors.push(dto.into_descriptor(order as u32)?);
        }
        Ok(CourseModules::from_descriptors(descriptors))
    }

    async fn is_enrolled(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<bool, CatalogError> {
        let url = self.url(&format!("api/enrollments/by-student/{user_id}"));
        let response = self.authorize(self.client.get(url)).send().await?;
        if !response.status().is_success() {
            return Err(CatalogError::HttpStatus(response.status()));
        }
        let body: EnrollmentListEnvelope = response.json().await?;
        Ok(body
            .enrollments
            .iter()
            .any(|e| e.course_id == course_id.as_str()))
    }
}

/// In-memory catalog for testing and prototyping.
#[derive(Default)]
pub struct InMemoryCatalog {
    courses: Mutex<HashMap<String, CourseModules>>,
    enrollments: Mutex<HashSet<(String, String)>>,
}

impl InMemoryCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a course.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned; test-support only.
    pub fn insert_course(&self, course_id: &CourseId, modules: CourseModules) {
        self.courses
            .lock()
            .expect("catalog lock poisoned")
            .insert(course_id.as_str().to_string(), modules);
    }

    /// Enroll a user in a course.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned; test-support only.
    pub fn enroll(&self, user_id: &UserId, course_id: &CourseId) {
        self.enrollments.lock().expect("catalog lock poisoned").insert((
            user_id.as_str().to_string(),
            course_id.as_str().to_string(),
        ));
    }
}

#[async_trait]
impl CourseCatalog for InMemoryCatalog {
    async fn course_modules(&self, course_id: &CourseId) -> Result<CourseModules, CatalogError> {
        self.courses
            .lock()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?
            .get(course_id.as_str())
            .cloned()
            .ok_or(CatalogError::CourseNotFound)
    }

    async fn is_enrolled(
        &self,
        user_id: &UserId,
        course_id: &CourseId,
    ) -> Result<bool, CatalogError> {
        Ok(self
            .enrollments
            .lock()
            .map_err(|e| CatalogError::Unavailable(e.to_string()))?
            .contains(&(
                user_id.as_str().to_string(),
                course_id.as_str().to_string(),
            )))
    }
}
