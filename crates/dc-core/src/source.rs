//! Sample sources.
//!
//! A source yields one [`Series`] at a time; each series is a fallible,
//! time-ordered sample stream of one participant.
//!
//! - [`MemorySource`]: in-memory series, mostly for tests and embedding
//! - [`JsonlSource`]: one JSON-lines file per series, read in batches
//! - [`Prefetch`]: opens the next series on a background thread and streams
//!   samples in batches

use dc_common::{Error, Result, Sample, SeriesKey};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{sync_channel, Receiver};
use std::thread::JoinHandle;
use tracing::{debug, warn};

/// Boxed fallible sample stream.
pub type SampleIter = Box<dyn Iterator<Item = Result<Sample>> + Send>;

/// One logical series.
pub struct Series {
    pub key: SeriesKey,
    pub samples: SampleIter,
}

impl Series {
    pub fn new(key: impl Into<String>, samples: SampleIter) -> Self {
        Series {
            key: SeriesKey::new(key),
            samples,
        }
    }

    /// Series over already loaded samples.
    pub fn from_samples(key: impl Into<String>, samples: Vec<Sample>) -> Self {
        Series::new(key, Box::new(samples.into_iter().map(Ok)))
    }
}

impl std::fmt::Debug for Series {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Series").field("key", &self.key).finish_non_exhaustive()
    }
}

/// Producer of series.
pub trait SampleSource {
    /// Next series, or `None` when the source is exhausted.
    fn next_series(&mut self) -> Result<Option<Series>>;
}

impl<S: SampleSource + ?Sized> SampleSource for Box<S> {
    fn next_series(&mut self) -> Result<Option<Series>> {
        (**self).next_series()
    }
}

/// Series held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    series: VecDeque<(SeriesKey, Vec<Sample>)>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, key: impl Into<String>, samples: Vec<Sample>) -> Self {
        self.series.push_back((SeriesKey::new(key), samples));
        self
    }

    /// Group samples by participant, keeping first-seen order of participants
    /// and arrival order within each.
    pub fn by_participant(samples: impl IntoIterator<Item = Sample>) -> Self {
        let mut source = MemorySource::new();
        for sample in samples {
            match source
                .series
                .iter_mut()
                .find(|(key, _)| key.as_str() == sample.participant)
            {
                Some((_, list)) => list.push(sample),
                None => source
                    .series
                    .push_back((SeriesKey::new(sample.participant.clone()), vec![sample])),
            }
        }
        source
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }
}

impl SampleSource for MemorySource {
    fn next_series(&mut self) -> Result<Option<Series>> {
        Ok(self
            .series
            .pop_front()
            .map(|(key, samples)| Series {
                key,
                samples: Box::new(samples.into_iter().map(Ok)),
            }))
    }
}

/// Default number of lines parsed per read batch.
pub const DEFAULT_BATCH_SIZE: usize = 4096;

/// One series per JSON-lines file; the file stem is the series key.
///
/// A file that cannot be opened becomes a series whose stream fails, so one
/// bad input does not stop the others.
#[derive(Debug)]
pub struct JsonlSource {
    paths: VecDeque<PathBuf>,
    batch_size: usize,
}

impl JsonlSource {
    pub fn new(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        JsonlSource {
            paths: paths.into_iter().collect(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// All `*.jsonl` files of a directory, sorted by name.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        Ok(JsonlSource::new(jsonl_files(dir)?))
    }
}

/// `*.jsonl` files directly inside `dir`, sorted by name.
pub fn jsonl_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| Error::Source(format!("{}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext == "jsonl"))
        .collect();
    paths.sort();
    Ok(paths)
}

fn series_key(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

impl SampleSource for JsonlSource {
    fn next_series(&mut self) -> Result<Option<Series>> {
        let Some(path) = self.paths.pop_front() else {
            return Ok(None);
        };
        let key = series_key(&path);
        let samples: SampleIter = match File::open(&path) {
            Ok(file) => Box::new(JsonlSamples {
                reader: BufReader::new(file),
                path: path.clone(),
                batch: VecDeque::new(),
                batch_size: self.batch_size,
                line_no: 0,
                done: false,
            }),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot open series");
                let err = Error::Source(format!("{}: {}", path.display(), e));
                Box::new(std::iter::once(Err(err)))
            }
        };
        Ok(Some(Series::new(key, samples)))
    }
}

/// Lazily parsed JSON-lines samples, refilled one batch at a time.
struct JsonlSamples {
    reader: BufReader<File>,
    path: PathBuf,
    batch: VecDeque<Result<Sample>>,
    batch_size: usize,
    line_no: usize,
    done: bool,
}

impl JsonlSamples {
    fn fill(&mut self) {
        let mut line = String::new();
        while self.batch.len() < self.batch_size {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.done = true;
                    return;
                }
                Ok(_) => {
                    self.line_no += 1;
                    if line.trim().is_empty() {
                        continue;
                    }
                    let parsed = serde_json::from_str::<Sample>(&line).map_err(|e| {
                        Error::Source(format!("{}:{}: {}", self.path.display(), self.line_no, e))
                    });
                    let failed = parsed.is_err();
                    self.batch.push_back(parsed);
                    if failed {
                        self.done = true;
                        return;
                    }
                }
                Err(e) => {
                    self.batch.push_back(Err(Error::Source(format!(
                        "{}: {}",
                        self.path.display(),
                        e
                    ))));
                    self.done = true;
                    return;
                }
            }
        }
    }
}

impl Iterator for JsonlSamples {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.batch.is_empty() && !self.done {
            self.fill();
        }
        self.batch.pop_front()
    }
}

/// Bounded lookahead over another source.
///
/// A background thread opens the next series while the consumer works on the
/// current one. Samples are not collected: each handed-out series streams
/// through its own reader thread in batches, so the engine consumes batch N
/// while batch N+1 is read. At most one opened series waits for the consumer;
/// series come out in source order. Dropping the prefetcher stops the producer.
pub struct Prefetch {
    receiver: Option<Receiver<Result<Series>>>,
    handle: Option<JoinHandle<()>>,
}

impl Prefetch {
    pub fn new<S>(source: S) -> Self
    where
        S: SampleSource + Send + 'static,
    {
        Prefetch::with_batch_size(source, DEFAULT_BATCH_SIZE)
    }

    pub fn with_batch_size<S>(mut source: S, batch_size: usize) -> Self
    where
        S: SampleSource + Send + 'static,
    {
        let batch_size = batch_size.max(1);
        let (sender, receiver) = sync_channel::<Result<Series>>(0);
        let handle = std::thread::spawn(move || loop {
            let opened = match source.next_series() {
                Ok(Some(series)) => Ok(Series {
                    key: series.key,
                    samples: Box::new(BatchStream::spawn(series.samples, batch_size)),
                }),
                Ok(None) => return,
                Err(e) => Err(e),
            };
            let failed = opened.is_err();
            if sender.send(opened).is_err() {
                debug!("prefetch consumer dropped");
                return;
            }
            if failed {
                return;
            }
        });
        Prefetch {
            receiver: Some(receiver),
            handle: Some(handle),
        }
    }
}

/// Samples of one series handed over from a reader thread a batch at a time.
///
/// The rendezvous channel lets the reader hold exactly one filled batch
/// ahead of the consumer.
struct BatchStream {
    receiver: Option<Receiver<Vec<Result<Sample>>>>,
    current: std::vec::IntoIter<Result<Sample>>,
    reader: Option<JoinHandle<()>>,
}

impl BatchStream {
    fn spawn(mut samples: SampleIter, batch_size: usize) -> Self {
        let (sender, receiver) = sync_channel::<Vec<Result<Sample>>>(0);
        let reader = std::thread::spawn(move || loop {
            let batch: Vec<Result<Sample>> = samples.by_ref().take(batch_size).collect();
            if batch.is_empty() || sender.send(batch).is_err() {
                return;
            }
        });
        BatchStream {
            receiver: Some(receiver),
            current: Vec::new().into_iter(),
            reader: Some(reader),
        }
    }
}

impl Iterator for BatchStream {
    type Item = Result<Sample>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.current.next() {
                return Some(item);
            }
            let batch = self.receiver.as_ref()?.recv().ok()?;
            self.current = batch.into_iter();
        }
    }
}

impl Drop for BatchStream {
    fn drop(&mut self) {
        drop(self.receiver.take());
        if let Some(reader) = self.reader.take() {
            if reader.join().is_err() {
                warn!("series reader panicked");
            }
        }
    }
}

impl SampleSource for Prefetch {
    fn next_series(&mut self) -> Result<Option<Series>> {
        let Some(receiver) = &self.receiver else {
            return Ok(None);
        };
        match receiver.recv() {
            Ok(loaded) => loaded.map(Some),
            // Producer finished.
            Err(_) => Ok(None),
        }
    }
}

impl Drop for Prefetch {
    fn drop(&mut self) {
        drop(self.receiver.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("prefetch producer panicked");
            }
        }
    }
}
