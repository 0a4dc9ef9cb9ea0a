//! Provisioning worker pool
//!
//! Requests are queued and picked up by a fixed number of workers. Each
//! worker runs the pipeline for one instance at a time, persists the result
//! and finishes the request's job.

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::errors::ManagerError;
use crate::jobs::{Job, JobState};
use crate::models::{ServerInstance, ServerInstanceProperty};
use crate::provision::pipeline::rollback;
use crate::provision::Provisioner;
use crate::store::Repository;

pub struct ProvisionRequest {
    pub job: Arc<Job>,
    pub instance: ServerInstance,
}

/// What a worker needs to run and persist a provisioning request
pub struct ProvisioningContext {
    pub provisioner: Arc<Provisioner>,
    pub instances: Arc<dyn Repository<ServerInstance>>,
    pub properties: Arc<dyn Repository<ServerInstanceProperty>>,
}

/// Sending half of the worker queue
#[derive(Clone)]
pub struct ProvisioningQueue {
    sender: mpsc::UnboundedSender<ProvisionRequest>,
}

impl ProvisioningQueue {
    pub fn submit(&self, request: ProvisionRequest) -> Result<(), ManagerError> {
        self.sender.send(request).map_err(|_| {
            ManagerError::ShutdownError("provisioning workers are not running".to_string())
        })
    }
}

/// Spawn `count` workers sharing one queue
pub fn spawn(
    count: usize,
    context: Arc<ProvisioningContext>,
    cancel: CancellationToken,
) -> (ProvisioningQueue, Vec<JoinHandle<()>>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    let receiver = Arc::new(Mutex::new(receiver));

    let handles = (0..count)
        .map(|worker| {
            tokio::spawn(run(
                worker,
                context.clone(),
                receiver.clone(),
                cancel.clone(),
            ))
        })
        .collect();

    (ProvisioningQueue { sender }, handles)
}

async fn run(
    worker: usize,
    context: Arc<ProvisioningContext>,
    receiver: Arc<Mutex<mpsc::UnboundedReceiver<ProvisionRequest>>>,
    cancel: CancellationToken,
) {
    info!("Provisioning worker {} starting...", worker);

    loop {
        let request = tokio::select! {
            _ = cancel.cancelled() => {
                info!("Provisioning worker {} shutting down...", worker);
                return;
            }
            request = async { receiver.lock().await.recv().await } => match request {
                Some(request) => request,
                None => {
                    info!("Provisioning queue closed, worker {} exiting", worker);
                    return;
                }
            },
        };

        execute(&context, request, &cancel).await;
    }
}

/// Run one request to completion and finish its job
pub async fn execute(
    context: &ProvisioningContext,
    request: ProvisionRequest,
    cancel: &CancellationToken,
) {
    let ProvisionRequest { job, mut instance } = request;
    job.log(format!("Provisioning server instance {}", instance.name()));

    let result = async {
        let properties = context
            .provisioner
            .provision(&mut instance, &job, cancel)
            .await?;
        commit(context, &instance, &properties, &job).await
    }
    .await;

    match result {
        Ok(()) => {
            job.log("Provisioning complete");
            job.finish(JobState::Success);
        }
        Err(e) => {
            error!("Provisioning job {} failed: {}", job.id(), e);
            job.log(format!("Error: {}", e));
            job.finish(JobState::Error);
        }
    }
}

/// Persist the property rows and mark the stored instance provisioned. Edits
/// made to the record while the job ran are kept, except a port change,
/// which no longer matches the written configuration. On failure the saved
/// rows and the instance directory are removed again.
async fn commit(
    context: &ProvisioningContext,
    instance: &ServerInstance,
    properties: &[ServerInstanceProperty],
    job: &Job,
) -> Result<(), ManagerError> {
    let mut saved: Vec<Uuid> = Vec::with_capacity(properties.len());

    let result = async {
        let mut stored = context
            .instances
            .get(instance.id())
            .await?
            .ok_or_else(|| ManagerError::NotFound(format!("server instance {}", instance.id())))?;
        if stored.port() != instance.port() {
            return Err(ManagerError::Conflict(format!(
                "port of server instance {} changed from {} to {} during provisioning",
                instance.id(),
                instance.port(),
                stored.port()
            )));
        }

        job.log("Saving properties");
        for property in properties {
            context.properties.add(property).await?;
            saved.push(property.id);
        }
        job.log("Updating instance");
        stored.accept_license();
        context.instances.update(&stored).await
    }
    .await;

    let Err(e) = result else {
        return Ok(());
    };

    job.log("Cleaning up server directory");
    for id in saved {
        if let Err(delete_err) = context.properties.delete(id).await {
            warn!("Failed to remove property row {}: {}", id, delete_err);
        }
    }
    let paths = context.provisioner.layout().instance(instance.id());
    Err(rollback(&paths, e).await)
}
