//! SQS and S3 backends for [`QueueSource`].
//!
//! The SDK is async; both backends share one current-thread Tokio runtime and
//! block on each call, keeping the pipeline strictly sequential.

use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use aws_config::{BehaviorVersion, SdkConfig};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_sqs::config::Region;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use super::error::SourceError;
use super::location::ObjectLocation;
use super::queue::{MessageQueue, ObjectStore, QueueMessage, QueueSource};
use crate::config::SourceConfig;

/// SQS caps long-poll waits at 20 seconds.
pub const MAX_WAIT: Duration = Duration::from_secs(20);

fn describe<E: std::error::Error>(err: E) -> String {
    DisplayErrorContext(err).to_string()
}

/// Shared runtime plus resolved SDK configuration.
#[derive(Clone)]
pub struct AwsContext {
    runtime: Arc<Runtime>,
    config: SdkConfig,
}

impl AwsContext {
    /// Build the runtime and load credentials for `region`.
    ///
    /// # Errors
    /// Returns `SourceError::Setup` if the runtime cannot be created.
    pub fn load(region: &str) -> Result<Self, SourceError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| SourceError::Setup(err.to_string()))?;
        let config = runtime.block_on(
            aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .load(),
        );
        debug!(region, "loaded AWS configuration");
        Ok(Self {
            runtime: Arc::new(runtime),
            config,
        })
    }
}

/// SQS queue addressed by its resolved URL.
pub struct SqsQueue {
    runtime: Arc<Runtime>,
    client: aws_sdk_sqs::Client,
    queue_url: String,
}

impl SqsQueue {
    /// Resolve `queue_name` to its URL.
    ///
    /// # Errors
    /// Returns `SourceError::QueueResolve` if the queue does not exist or the
    /// lookup fails.
    pub fn resolve(context: &AwsContext, queue_name: &str) -> Result<Self, SourceError> {
        let client = aws_sdk_sqs::Client::new(&context.config);
        let resolve_err = |message: String| SourceError::QueueResolve {
            queue: queue_name.to_string(),
            message,
        };
        let output = context
            .runtime
            .block_on(client.get_queue_url().queue_name(queue_name).send())
            .map_err(|err| resolve_err(describe(err)))?;
        let queue_url = output
            .queue_url()
            .ok_or_else(|| resolve_err("no queue URL returned".to_string()))?
            .to_string();
        info!(queue = queue_name, url = %queue_url, "resolved queue");
        Ok(Self {
            runtime: Arc::clone(&context.runtime),
            client,
            queue_url,
        })
    }
}

impl MessageQueue for SqsQueue {
    fn receive(&mut self, wait: Duration) -> Result<Option<QueueMessage>, SourceError> {
        let wait_seconds = wait.min(MAX_WAIT).as_secs() as i32;
        let output = self
            .runtime
            .block_on(
                self.client
                    .receive_message()
                    .queue_url(&self.queue_url)
                    .max_number_of_messages(1)
                    .wait_time_seconds(wait_seconds)
                    .send(),
            )
            .map_err(|err| SourceError::Receive(describe(err)))?;

        let Some(message) = output.messages().first() else {
            return Ok(None);
        };
        let receipt_handle = message
            .receipt_handle()
            .ok_or_else(|| SourceError::Receive("message without receipt handle".to_string()))?;
        Ok(Some(QueueMessage {
            body: message.body().unwrap_or_default().to_string(),
            receipt_handle: receipt_handle.to_string(),
        }))
    }

    fn acknowledge(&mut self, receipt_handle: &str) -> Result<(), SourceError> {
        self.runtime
            .block_on(
                self.client
                    .delete_message()
                    .queue_url(&self.queue_url)
                    .receipt_handle(receipt_handle)
                    .send(),
            )
            .map_err(|err| SourceError::Acknowledge(describe(err)))?;
        Ok(())
    }
}

/// S3 object storage.
pub struct S3Store {
    runtime: Arc<Runtime>,
    client: aws_sdk_s3::Client,
}

impl S3Store {
    pub fn new(context: &AwsContext) -> Self {
        Self {
            runtime: Arc::clone(&context.runtime),
            client: aws_sdk_s3::Client::new(&context.config),
        }
    }
}

impl ObjectStore for S3Store {
    fn download(
        &mut self,
        location: &ObjectLocation,
        destination: &Path,
    ) -> Result<u64, SourceError> {
        let download_err = |message: String| SourceError::Download {
            locator: location.to_string(),
            message,
        };
        self.runtime.block_on(async {
            let mut object = self
                .client
                .get_object()
                .bucket(&location.bucket)
                .key(&location.key)
                .send()
                .await
                .map_err(|err| download_err(describe(err)))?;

            // Stream to disk chunk by chunk; captures can be large.
            let mut file = File::create(destination)?;
            let mut written = 0u64;
            while let Some(chunk) = object
                .body
                .try_next()
                .await
                .map_err(|err| download_err(describe(err)))?
            {
                file.write_all(&chunk)?;
                written += chunk.len() as u64;
            }
            file.sync_all()?;
            Ok::<u64, SourceError>(written)
        })
    }

    fn upload(&mut self, source: &Path, location: &ObjectLocation) -> Result<(), SourceError> {
        let upload_err = |message: String| SourceError::Upload {
            destination: location.to_string(),
            message,
        };
        self.runtime.block_on(async {
            let body = ByteStream::from_path(source)
                .await
                .map_err(|err| upload_err(describe(err)))?;
            self.client
                .put_object()
                .bucket(&location.bucket)
                .key(&location.key)
                .body(body)
                .send()
                .await
                .map_err(|err| upload_err(describe(err)))?;
            Ok::<(), SourceError>(())
        })
    }
}

/// Connect a queue-driven source: the first input names the queue.
///
/// # Errors
/// Returns `SourceError` if no input is configured or the queue cannot be
/// resolved.
pub fn connect_queue_source(
    config: &SourceConfig,
) -> Result<QueueSource<SqsQueue, S3Store>, SourceError> {
    let queue_name = config.inputs.first().ok_or(SourceError::NoInputs)?;
    let context = AwsContext::load(&config.region)?;
    let queue = SqsQueue::resolve(&context, queue_name)?;
    let store = S3Store::new(&context);
    Ok(QueueSource::new(
        queue,
        store,
        config.output.clone(),
        config.work_dir.clone(),
        config.wait_time,
    ))
}
