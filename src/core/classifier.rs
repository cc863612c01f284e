use crate::common::{Result, VisiRideError};
use std::io::{self, Read};
use std::path::Path;
use std::process::{Command, Output, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const UNKNOWN_PERSON: &str = "unknown_person";
const NO_PERSONS_FOUND: &str = "no_persons_found";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    Recognized(String),
    UnknownPerson,
    NoPersonsFound,
}

impl MatchResult {
    /// Interpret recognizer output.
    ///
    /// The tool prints one `<probe path>,<name>` line per face found in the
    /// probe; the last line is taken as the best match.
    pub fn parse(stdout: &str) -> Result<Self> {
        let line = stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .last()
            .ok_or_else(|| VisiRideError::ExternalTool("recognizer produced no output".into()))?;

        let name = line.rsplit(',').next().unwrap_or(line).trim();
        match name {
            "" => Err(VisiRideError::ExternalTool(format!("unreadable recognizer output: {:?}", line))),
            UNKNOWN_PERSON => Ok(MatchResult::UnknownPerson),
            NO_PERSONS_FOUND => Ok(MatchResult::NoPersonsFound),
            name => Ok(MatchResult::Recognized(name.to_string())),
        }
    }
}

/// Matches a probe image against a directory of `<username>.jpg` references.
pub trait Classifier: Send + Sync {
    fn classify(&self, probe: &Path, gallery: &Path) -> Result<MatchResult>;
}

/// Liveness check used at signup: does the image directory contain a face.
pub trait FaceDetector: Send + Sync {
    fn contains_face(&self, image_dir: &Path) -> Result<bool>;
}

/// Runs an external recognizer, e.g. `face_recognition <gallery> <probe>`.
pub struct CommandClassifier {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandClassifier {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.into(), args, timeout }
    }
}

impl Classifier for CommandClassifier {
    fn classify(&self, probe: &Path, gallery: &Path) -> Result<MatchResult> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(gallery).arg(probe);

        let output = run_with_deadline(cmd, self.timeout)?;
        if !output.status.success() {
            return Err(VisiRideError::ExternalTool(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        let stdout = String::from_utf8(output.stdout)
            .map_err(|_| VisiRideError::ExternalTool("recognizer output is not UTF-8".into()))?;
        MatchResult::parse(&stdout)
    }
}

/// Runs an external detector, e.g. `face_detection <dir>`; any output line means a face.
pub struct CommandFaceDetector {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandFaceDetector {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self { program: program.into(), args, timeout }
    }
}

impl FaceDetector for CommandFaceDetector {
    fn contains_face(&self, image_dir: &Path) -> Result<bool> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(image_dir);

        let output = run_with_deadline(cmd, self.timeout)?;
        if !output.status.success() {
            return Err(VisiRideError::ExternalTool(format!(
                "{} exited with {}", self.program, output.status
            )));
        }
        Ok(output.stdout.iter().any(|b| !b.is_ascii_whitespace()))
    }
}

/// Spawn `cmd` and collect its output, killing it once `timeout` elapses.
///
/// Both pipes are drained on helper threads while the child runs, so chatty
/// tools cannot stall on a full pipe.
fn run_with_deadline(mut cmd: Command, timeout: Duration) -> Result<Output> {
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| VisiRideError::ExternalTool(format!("failed to spawn {:?}: {}", cmd.get_program(), e)))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait()? {
            Some(status) => break status,
            None if Instant::now() >= deadline => {
                let _ = child.kill();
                let _ = child.wait();
                // Readers are left detached; a grandchild may still hold the pipes
                return Err(VisiRideError::ExternalTool(format!(
                    "{:?} timed out after {:?}", cmd.get_program(), timeout
                )));
            }
            None => thread::sleep(Duration::from_millis(25)),
        }
    };

    Ok(Output {
        status,
        stdout: collect(stdout)?,
        stderr: collect(stderr)?,
    })
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<io::Result<Vec<u8>>>> {
    pipe.map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            pipe.read_to_end(&mut buf)?;
            Ok(buf)
        })
    })
}

fn collect(reader: Option<JoinHandle<io::Result<Vec<u8>>>>) -> Result<Vec<u8>> {
    match reader {
        Some(handle) => handle
            .join()
            .map_err(|_| VisiRideError::ExternalTool("output reader panicked".into()))?
            .map_err(VisiRideError::from),
        None => Ok(Vec::new()),
    }
}
