//! In-process remote build service.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rebuild_protocol::{Build, BuildJob, BuildResults, BuildStatus, Operation, ServiceError};

use crate::remote::RemoteBuildService;

type CreateHook = Arc<dyn Fn(&BuildJob) + Send + Sync>;

struct MockOperation {
    build: Build,
    position: usize,
}

#[derive(Default)]
struct MockBuildState {
    operations: HashMap<String, MockOperation>,
    submitted: Vec<BuildJob>,
    cancelled: Vec<String>,
    polls: usize,
    poll_error: Option<ServiceError>,
    last_build_id: Option<String>,
    next_id: u64,
}

/// Scripted build service.
///
/// Each build walks through a fixed status progression, one step per poll,
/// and stays on the last status. Clones share state.
#[derive(Clone)]
pub struct MockBuildService {
    state: Arc<Mutex<MockBuildState>>,
    progression: Vec<BuildStatus>,
    build_id: Option<String>,
    step_images: Option<Vec<String>>,
    on_create: Option<CreateHook>,
}

impl Default for MockBuildService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBuildService {
    /// Builds go QUEUED → WORKING → SUCCESS.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockBuildState::default())),
            progression: vec![BuildStatus::Queued, BuildStatus::Working, BuildStatus::Success],
            build_id: None,
            step_images: None,
            on_create: None,
        }
    }

    /// Replace the status progression; an empty list is ignored.
    pub fn with_progression(mut self, progression: Vec<BuildStatus>) -> Self {
        if !progression.is_empty() {
            self.progression = progression;
        }
        self
    }

    /// Assign this id to every build instead of a generated one.
    pub fn with_build_id(mut self, id: impl Into<String>) -> Self {
        self.build_id = Some(id.into());
        self
    }

    /// Step image digests reported on completion. Defaults to one per step.
    pub fn with_step_images(mut self, images: Vec<String>) -> Self {
        self.step_images = Some(images);
        self
    }

    /// Run `hook` on every submitted job, e.g. to fake the job's uploads.
    pub fn on_create(mut self, hook: impl Fn(&BuildJob) + Send + Sync + 'static) -> Self {
        self.on_create = Some(Arc::new(hook));
        self
    }

    /// Fail every subsequent poll with `error`.
    pub fn fail_polls_with(&self, error: ServiceError) {
        self.state.lock().unwrap().poll_error = Some(error);
    }

    pub fn submitted(&self) -> Vec<BuildJob> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.state.lock().unwrap().cancelled.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.state.lock().unwrap().polls
    }

    pub fn last_build_id(&self) -> Option<String> {
        self.state.lock().unwrap().last_build_id.clone()
    }

    fn apply_status(&self, build: &mut Build, status: BuildStatus) {
        build.status = status;
        if status == BuildStatus::Working && build.start_time.is_none() {
            build.start_time = Some(Utc::now());
        }
        if status.is_terminal() {
            if build.start_time.is_none() {
                build.start_time = Some(Utc::now());
            }
            build.finish_time = Some(Utc::now());
            let images = self.step_images.clone().unwrap_or_else(|| {
                (0..build.steps.len())
                    .map(|i| format!("sha256:{:064x}", i + 1))
                    .collect()
            });
            build.results = Some(BuildResults {
                build_step_images: images,
            });
        }
    }

    fn view(name: &str, build: &Build) -> Operation {
        Operation {
            name: name.to_string(),
            done: build.status.is_terminal(),
            metadata: Some(rebuild_protocol::OperationMetadata {
                build: build.clone(),
            }),
            error: None,
        }
    }
}

impl RemoteBuildService for MockBuildService {
    fn create_build(&self, project: &str, job: &BuildJob) -> Result<Operation, ServiceError> {
        if job.steps.is_empty() {
            return Err(ServiceError::invalid_job("job has no steps"));
        }
        let op = {
            let mut state = self.state.lock().unwrap();
            state.next_id += 1;
            let id = self
                .build_id
                .clone()
                .unwrap_or_else(|| format!("build-{}", state.next_id));
            let name = format!("operations/build/{}/{}-{}", project, id, state.next_id);
            let mut build = Build {
                id: id.clone(),
                project_id: project.to_string(),
                status: BuildStatus::StatusUnknown,
                status_detail: None,
                steps: job.steps.clone(),
                results: None,
                create_time: Some(Utc::now()),
                start_time: None,
                finish_time: None,
                log_url: None,
            };
            self.apply_status(&mut build, self.progression[0]);
            let op = Self::view(&name, &build);
            state.operations.insert(name, MockOperation { build, position: 0 });
            state.submitted.push(job.clone());
            state.last_build_id = Some(id);
            op
        };
        if let Some(hook) = &self.on_create {
            hook(job);
        }
        Ok(op)
    }

    fn get_operation(&self, op: &Operation) -> Result<Operation, ServiceError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        if let Some(err) = &state.poll_error {
            return Err(err.clone());
        }
        let last = self.progression.len() - 1;
        let entry = state
            .operations
            .get_mut(&op.name)
            .ok_or_else(|| ServiceError::operation_not_found(&op.name))?;
        if !entry.build.status.is_terminal() && entry.position < last {
            entry.position += 1;
            let status = self.progression[entry.position];
            self.apply_status(&mut entry.build, status);
        }
        Ok(Self::view(&op.name, &entry.build))
    }

    fn cancel_build(&self, _project: &str, build_id: &str) -> Result<(), ServiceError> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .operations
            .values_mut()
            .find(|o| o.build.id == build_id)
            .ok_or_else(|| ServiceError::build_not_found(build_id))?;
        if !entry.build.status.is_terminal() {
            self.apply_status(&mut entry.build, BuildStatus::Cancelled);
        }
        state.cancelled.push(build_id.to_string());
        Ok(())
    }
}
