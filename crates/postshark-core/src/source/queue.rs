use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::error::SourceError;
use super::location::{ObjectLocation, file_name, is_object_path, join_location};
use super::notification::{StorageNotification, decode_notification};
use super::{Job, RequestSource};

const PARTIAL_SUFFIX: &str = ".partial";

/// One received queue message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub body: String,
    pub receipt_handle: String,
}

/// Receive/acknowledge half of a queue backend.
pub trait MessageQueue {
    /// Receive at most one message, waiting up to `wait` for one to arrive.
    fn receive(&mut self, wait: Duration) -> Result<Option<QueueMessage>, SourceError>;

    /// Delete a received message so it is not redelivered.
    fn acknowledge(&mut self, receipt_handle: &str) -> Result<(), SourceError>;
}

/// Object storage used to fetch captures and persist artifacts.
pub trait ObjectStore {
    /// Download `location` into the local file `destination`; returns bytes.
    fn download(&mut self, location: &ObjectLocation, destination: &Path)
    -> Result<u64, SourceError>;

    /// Upload the local file `source` to `location`.
    fn upload(&mut self, source: &Path, location: &ObjectLocation) -> Result<(), SourceError>;
}

/// Jobs driven by object-created notifications arriving on a queue.
///
/// Captures are downloaded into a working directory; artifacts go to the
/// configured output (an `s3://` prefix or a local directory). `complete`
/// always persists before it acknowledges, so a crash in between only causes
/// a redelivery.
pub struct QueueSource<Q, S> {
    queue: Q,
    store: S,
    output: String,
    work_dir: PathBuf,
    wait: Duration,
    current: Option<Job>,
}

impl<Q: MessageQueue, S: ObjectStore> QueueSource<Q, S> {
    pub fn new(
        queue: Q,
        store: S,
        output: impl Into<String>,
        work_dir: impl Into<PathBuf>,
        wait: Duration,
    ) -> Self {
        Self {
            queue,
            store,
            output: output.into(),
            work_dir: work_dir.into(),
            wait,
            current: None,
        }
    }

    /// Where an artifact named like `artifact` ends up.
    pub fn destination_for(&self, artifact: &Path) -> Result<String, SourceError> {
        Ok(join_location(&self.output, file_name(artifact)?))
    }

    fn persist(&mut self, artifact: &Path, destination: &str) -> Result<(), SourceError> {
        if is_object_path(destination) {
            let location = ObjectLocation::parse(destination)?;
            self.store.upload(artifact, &location)?;
        } else {
            copy_atomically(artifact, Path::new(destination))?;
        }
        info!(artifact = %artifact.display(), destination, "artifact persisted");
        Ok(())
    }
}

impl<Q: MessageQueue, S: ObjectStore> RequestSource for QueueSource<Q, S> {
    fn has_more(&mut self) -> Result<bool, SourceError> {
        loop {
            let Some(message) = self.queue.receive(self.wait)? else {
                self.current = None;
                debug!("queue is empty");
                return Ok(false);
            };
            match decode_notification(&message.body)? {
                StorageNotification::Test => {
                    debug!("acknowledging storage test event");
                    self.queue.acknowledge(&message.receipt_handle)?;
                }
                StorageNotification::Object(location) => {
                    let job =
                        Job::new(location.to_string()).with_origin_token(message.receipt_handle);
                    debug!(locator = %job.locator, "received job");
                    self.current = Some(job);
                    return Ok(true);
                }
            }
        }
    }

    fn get_value(&self) -> Option<Job> {
        self.current.clone()
    }

    fn fetch(&mut self, job: &mut Job) -> Result<PathBuf, SourceError> {
        let location = ObjectLocation::parse(&job.locator)?;
        let name = location.base_name();
        if name.is_empty() {
            return Err(SourceError::InvalidLocator(job.locator.clone()));
        }
        let local = self.work_dir.join(name);
        let partial = with_suffix(&local, PARTIAL_SUFFIX);

        let downloaded = self
            .store
            .download(&location, &partial)
            .and_then(|bytes| fs::rename(&partial, &local).map(|()| bytes).map_err(Into::into));
        let bytes = match downloaded {
            Ok(bytes) => bytes,
            Err(err) => {
                remove_if_present(&partial);
                return Err(err);
            }
        };

        info!(locator = %job.locator, local = %local.display(), bytes, "fetched capture");
        job.local_path = Some(local.clone());
        Ok(local)
    }

    fn complete(&mut self, job: Job, artifact: &Path) -> Result<(), SourceError> {
        let destination = self.destination_for(artifact)?;
        let in_place =
            !is_object_path(&destination) && same_file(Path::new(&destination), artifact);

        if in_place {
            debug!(artifact = %artifact.display(), "artifact already at destination");
        } else {
            self.persist(artifact, &destination)?;
        }

        if let Some(token) = job.origin_token.as_deref() {
            self.queue.acknowledge(token)?;
            debug!(locator = %job.locator, "acknowledged queue message");
        }

        if let Some(local) = job.local_path.as_deref() {
            if local != artifact {
                remove_if_present(local);
            }
        }
        if !in_place {
            remove_if_present(artifact);
        }
        Ok(())
    }
}

/// Whether two local paths name the same file, however they are spelled.
///
/// Parents are resolved rather than the paths themselves so a destination that
/// does not exist yet still compares correctly.
fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (resolve_parent(a), resolve_parent(b)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

fn resolve_parent(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::canonicalize(parent).ok().map(|dir| dir.join(name))
}

/// Copy `from` to `to` through a temporary name so `to` is never partial.
pub fn copy_atomically(from: &Path, to: &Path) -> Result<u64, SourceError> {
    let partial = with_suffix(to, PARTIAL_SUFFIX);
    let copy_err = |source: io::Error| SourceError::Copy {
        from: from.to_path_buf(),
        to: to.to_path_buf(),
        source,
    };
    let copied = fs::copy(from, &partial).map_err(copy_err)?;
    if let Err(err) = fs::rename(&partial, to) {
        remove_if_present(&partial);
        return Err(copy_err(err));
    }
    Ok(copied)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

fn remove_if_present(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "removed local file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove local file"),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::{HashMap, VecDeque};
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::rc::Rc;
    use std::time::Duration;

    use super::{MessageQueue, ObjectStore, QueueMessage, QueueSource};
    use crate::source::{Job, ObjectLocation, RequestSource, SourceError};

    /// Call log shared between fakes so ordering across them can be checked.
    type Calls = Rc<RefCell<Vec<String>>>;

    struct FakeQueue {
        messages: VecDeque<QueueMessage>,
        calls: Calls,
        fail_ack: bool,
    }

    impl MessageQueue for FakeQueue {
        fn receive(&mut self, wait: Duration) -> Result<Option<QueueMessage>, SourceError> {
            self.calls.borrow_mut().push(format!("receive {}", wait.as_secs()));
            Ok(self.messages.pop_front())
        }

        fn acknowledge(&mut self, receipt_handle: &str) -> Result<(), SourceError> {
            self.calls.borrow_mut().push(format!("ack {receipt_handle}"));
            if self.fail_ack {
                return Err(SourceError::Acknowledge("denied".to_string()));
            }
            Ok(())
        }
    }

    struct FakeStore {
        objects: HashMap<String, Vec<u8>>,
        uploaded: HashMap<String, Vec<u8>>,
        calls: Calls,
        fail_upload: bool,
    }

    impl ObjectStore for FakeStore {
        fn download(
            &mut self,
            location: &ObjectLocation,
            destination: &Path,
        ) -> Result<u64, SourceError> {
            self.calls.borrow_mut().push(format!("download {location}"));
            let data = self.objects.get(&location.to_string()).ok_or_else(|| {
                SourceError::Download {
                    locator: location.to_string(),
                    message: "NoSuchKey".to_string(),
                }
            })?;
            fs::write(destination, data)?;
            Ok(data.len() as u64)
        }

        fn upload(&mut self, source: &Path, location: &ObjectLocation) -> Result<(), SourceError> {
            self.calls.borrow_mut().push(format!("upload {location}"));
            if self.fail_upload {
                return Err(SourceError::Upload {
                    destination: location.to_string(),
                    message: "AccessDenied".to_string(),
                });
            }
            self.uploaded.insert(location.to_string(), fs::read(source)?);
            Ok(())
        }
    }

    fn notification(bucket: &str, key: &str) -> String {
        format!(r#"{{"Records":[{{"s3":{{"bucket":{{"name":"{bucket}"}},"object":{{"key":"{key}"}}}}}}]}}"#)
    }

    fn message(body: String, receipt: &str) -> QueueMessage {
        QueueMessage {
            body,
            receipt_handle: receipt.to_string(),
        }
    }

    fn source(
        messages: Vec<QueueMessage>,
        output: &str,
        work_dir: &Path,
    ) -> (QueueSource<FakeQueue, FakeStore>, Calls) {
        let calls = Calls::default();
        let queue = FakeQueue {
            messages: messages.into(),
            calls: calls.clone(),
            fail_ack: false,
        };
        let store = FakeStore {
            objects: HashMap::from([(
                "s3://captures/in/edge.pcap".to_string(),
                b"pcap bytes".to_vec(),
            )]),
            uploaded: HashMap::new(),
            calls: calls.clone(),
            fail_upload: false,
        };
        let source = QueueSource::new(queue, store, output, work_dir, Duration::from_secs(15));
        (source, calls)
    }

    #[test]
    fn empty_receive_returns_false_and_no_job() {
        let dir = tempfile::tempdir().unwrap();
        let (mut source, calls) = source(Vec::new(), "s3://results/out", dir.path());
        assert!(source.get_value().is_none());
        assert!(!source.has_more().unwrap());
        assert!(source.get_value().is_none());
        assert_eq!(*calls.borrow(), vec!["receive 15"]);
    }

    #[test]
    fn empty_receive_leaves_issued_jobs_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let (mut source, _) = source(messages, "s3://results/out", dir.path());
        let job = source.next_job().unwrap().unwrap();
        assert!(!source.has_more().unwrap());
        assert_eq!(job.locator, "s3://captures/in/edge.pcap");
        assert_eq!(job.origin_token.as_deref(), Some("r-1"));
    }

    #[test]
    fn message_becomes_job_with_receipt() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let (mut source, _) = source(messages, "s3://results/out", dir.path());
        assert!(source.has_more().unwrap());
        let job = source.get_value().unwrap();
        assert_eq!(
            job,
            Job::new("s3://captures/in/edge.pcap").with_origin_token("r-1")
        );
    }

    #[test]
    fn test_events_are_acknowledged_and_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![
            message(r#"{"Event":"s3:TestEvent"}"#.to_string(), "r-test"),
            message(notification("captures", "in/edge.pcap"), "r-1"),
        ];
        let (mut source, calls) = source(messages, "s3://results/out", dir.path());
        assert!(source.has_more().unwrap());
        assert_eq!(source.get_value().unwrap().origin_token.as_deref(), Some("r-1"));
        assert_eq!(
            *calls.borrow(),
            vec!["receive 15", "ack r-test", "receive 15"]
        );
    }

    #[test]
    fn undecodable_message_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message("{}".to_string(), "r-1")];
        let (mut source, calls) = source(messages, "s3://results/out", dir.path());
        assert!(matches!(
            source.has_more(),
            Err(SourceError::Notification(_))
        ));
        assert!(!calls.borrow().iter().any(|c| c.starts_with("ack")));
    }

    #[test]
    fn fetch_downloads_into_work_dir_by_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let (mut source, _) = source(messages, "s3://results/out", dir.path());
        let mut job = source.next_job().unwrap().unwrap();
        let local = source.fetch(&mut job).unwrap();
        assert_eq!(local, dir.path().join("edge.pcap"));
        assert_eq!(job.local_path.as_ref(), Some(&local));
        assert_eq!(fs::read(&local).unwrap(), b"pcap bytes");
        assert!(!dir.path().join("edge.pcap.partial").exists());
    }

    #[test]
    fn failed_download_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/missing.pcap"), "r-1")];
        let (mut source, _) = source(messages, "s3://results/out", dir.path());
        let mut job = source.next_job().unwrap().unwrap();
        assert!(matches!(
            source.fetch(&mut job),
            Err(SourceError::Download { .. })
        ));
        assert!(job.local_path.is_none());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn fetch_rejects_local_locators() {
        let dir = tempfile::tempdir().unwrap();
        let (mut source, _) = source(Vec::new(), "s3://results/out", dir.path());
        let mut job = Job::new("/local/file.pcap");
        assert!(matches!(
            source.fetch(&mut job),
            Err(SourceError::InvalidLocator(_))
        ));
    }

    #[test]
    fn complete_uploads_then_acknowledges_then_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let (mut source, calls) = source(messages, "s3://results/out/", dir.path());
        let mut job = source.next_job().unwrap().unwrap();
        let local = source.fetch(&mut job).unwrap();
        let artifact = dir.path().join("edge.pcap.parquet");
        fs::write(&artifact, b"parquet bytes").unwrap();

        source.complete(job, &artifact).unwrap();

        assert_eq!(
            *calls.borrow(),
            vec![
                "receive 15",
                "download s3://captures/in/edge.pcap",
                "upload s3://results/out/edge.pcap.parquet",
                "ack r-1",
            ]
        );
        assert_eq!(
            source.store.uploaded["s3://results/out/edge.pcap.parquet"],
            b"parquet bytes"
        );
        assert!(!local.exists());
        assert!(!artifact.exists());
    }

    #[test]
    fn failed_upload_is_never_acknowledged() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let (mut source, calls) = source(messages, "s3://results/out", dir.path());
        source.store.fail_upload = true;
        let mut job = source.next_job().unwrap().unwrap();
        let local = source.fetch(&mut job).unwrap();
        let artifact = dir.path().join("edge.pcap.parquet");
        fs::write(&artifact, b"parquet bytes").unwrap();

        assert!(matches!(
            source.complete(job, &artifact),
            Err(SourceError::Upload { .. })
        ));
        assert!(!calls.borrow().iter().any(|c| c.starts_with("ack")));
        assert!(local.exists());
        assert!(artifact.exists());
    }

    #[test]
    fn failed_acknowledge_keeps_uploaded_result() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let (mut source, _) = source(messages, "s3://results/out", dir.path());
        source.queue.fail_ack = true;
        let mut job = source.next_job().unwrap().unwrap();
        source.fetch(&mut job).unwrap();
        let artifact = dir.path().join("edge.pcap.parquet");
        fs::write(&artifact, b"parquet bytes").unwrap();

        assert!(matches!(
            source.complete(job, &artifact),
            Err(SourceError::Acknowledge(_))
        ));
        assert!(
            source
                .store
                .uploaded
                .contains_key("s3://results/out/edge.pcap.parquet")
        );
    }

    #[test]
    fn complete_in_place_skips_upload() {
        let dir = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let output = dir.path().to_str().unwrap().to_string();
        let (mut source, calls) = source(messages, &output, dir.path());
        let mut job = source.next_job().unwrap().unwrap();
        let local = source.fetch(&mut job).unwrap();
        let artifact = dir.path().join("edge.pcap.parquet");
        fs::write(&artifact, b"parquet bytes").unwrap();

        source.complete(job, &artifact).unwrap();

        assert!(!calls.borrow().iter().any(|c| c.starts_with("upload")));
        assert!(calls.borrow().iter().any(|c| c == "ack r-1"));
        assert_eq!(fs::read(&artifact).unwrap(), b"parquet bytes");
        assert!(!local.exists());
    }

    #[test]
    fn complete_to_local_directory_copies() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let output = out.path().to_str().unwrap().to_string();
        let (mut source, calls) = source(messages, &output, work.path());
        let mut job = source.next_job().unwrap().unwrap();
        source.fetch(&mut job).unwrap();
        let artifact = work.path().join("edge.pcap.parquet");
        fs::write(&artifact, b"parquet bytes").unwrap();

        source.complete(job, &artifact).unwrap();

        let copied = out.path().join("edge.pcap.parquet");
        assert_eq!(fs::read(&copied).unwrap(), b"parquet bytes");
        assert!(!out.path().join("edge.pcap.parquet.partial").exists());
        assert!(!artifact.exists());
        assert!(calls.borrow().iter().any(|c| c == "ack r-1"));
    }

    /// Fetch and complete one job, returning the outcome and the artifact path.
    fn complete_with_output(
        output: &str,
        work: &Path,
    ) -> (Result<(), SourceError>, Calls, PathBuf) {
        let messages = vec![message(notification("captures", "in/edge.pcap"), "r-1")];
        let (mut source, calls) = source(messages, output, work);
        let mut job = source.next_job().unwrap().unwrap();
        source.fetch(&mut job).unwrap();
        let artifact = work.join("edge.pcap.parquet");
        fs::write(&artifact, b"parquet bytes").unwrap();
        let result = source.complete(job, &artifact);
        (result, calls, artifact)
    }

    #[test]
    fn complete_in_place_through_aliased_output_keeps_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("w");
        fs::create_dir(&work).unwrap();
        let output = format!("{}/w/../w", dir.path().display());

        let (result, calls, artifact) = complete_with_output(&output, &work);

        result.unwrap();
        assert_eq!(fs::read(&artifact).unwrap(), b"parquet bytes");
        assert!(!work.join("edge.pcap.parquet.partial").exists());
        assert!(calls.borrow().iter().any(|c| c == "ack r-1"));
    }

    #[cfg(unix)]
    #[test]
    fn complete_in_place_through_symlinked_output_keeps_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let work = dir.path().join("w");
        fs::create_dir(&work).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&work, &link).unwrap();

        let (result, _, artifact) = complete_with_output(link.to_str().unwrap(), &work);

        result.unwrap();
        assert_eq!(fs::read(&artifact).unwrap(), b"parquet bytes");
    }

    #[test]
    fn copy_into_missing_directory_is_never_acknowledged() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let missing = out.path().join("absent");

        let (result, calls, artifact) =
            complete_with_output(missing.to_str().unwrap(), work.path());

        assert!(matches!(result, Err(SourceError::Copy { .. })));
        assert!(!calls.borrow().iter().any(|c| c.starts_with("ack")));
        assert!(artifact.exists());
        assert!(work.path().join("edge.pcap").exists());
        assert!(!missing.join("edge.pcap.parquet.partial").exists());
    }

    #[test]
    fn failed_rename_removes_partial_copy() {
        let work = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        // A non-empty directory squats on the destination name.
        let blocker = out.path().join("edge.pcap.parquet");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        let (result, calls, artifact) =
            complete_with_output(out.path().to_str().unwrap(), work.path());

        assert!(matches!(result, Err(SourceError::Copy { .. })));
        assert!(!calls.borrow().iter().any(|c| c.starts_with("ack")));
        assert!(!out.path().join("edge.pcap.parquet.partial").exists());
        assert!(artifact.exists());
    }
}
