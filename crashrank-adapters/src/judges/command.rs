//! Judge that delegates to an external program
//!
//! The group is written to the program's stdin as JSON:
//!
//! ```json
//! {"items": [{"id": "run1_crash_a", "payload": "/abs/path/crash_a.json"}, ...]}
//! ```
//!
//! The program must exit successfully and print a JSON object with an
//! `ordered` array of ids, most exploitable first, plus optional `rationale`
//! or `rationale_top` strings. Surrounding text (log lines, markdown fences)
//! is tolerated; the first object carrying `ordered` wins. An envelope of the
//! form `{"result": "<text>"}` is unwrapped first.
//!
//! A call that runs past its timeout (300 s by default) is killed and counts
//! as a judge failure.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crashrank_core::{Item, ItemId, Judge, JudgeError, Judgment};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

/// Default limit for one judge call
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

const POLL_INTERVAL: Duration = Duration::from_millis(20);

#[derive(Serialize)]
struct GroupRequest<'a> {
    items: Vec<RequestItem<'a>>,
}

#[derive(Serialize)]
struct RequestItem<'a> {
    id: &'a str,
    payload: &'a str,
}

#[derive(Debug, Deserialize)]
struct JudgeReply {
    ordered: Vec<ItemId>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    rationale_top: Option<String>,
}

/// Runs `program args..` once per group
#[derive(Clone, Debug)]
pub struct CommandJudge {
    program: String,
    args: Vec<String>,
    judge_id: String,
    timeout: Duration,
}

impl CommandJudge {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let program = program.into();
        let name = std::path::Path::new(&program)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.clone());
        Self {
            judge_id: format!("command:{}", name),
            program,
            args,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Kill the program and fail the call after `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn request_body(group: &[Item]) -> Result<Vec<u8>, JudgeError> {
        let request = GroupRequest {
            items: group
                .iter()
                .map(|item| RequestItem {
                    id: &item.id,
                    payload: &item.payload,
                })
                .collect(),
        };
        serde_json::to_vec(&request).map_err(|e| JudgeError::Failed(format!("failed to encode group: {}", e)))
    }
}

impl Judge for CommandJudge {
    fn judge_id(&self) -> &str {
        &self.judge_id
    }

    fn evaluate(&self, group: &[Item]) -> Result<Judgment, JudgeError> {
        let body = Self::request_body(group)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| JudgeError::Failed(format!("failed to start {}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            thread::spawn(move || {
                // A judge that exits without reading its input is not an error by itself
                if let Err(e) = stdin.write_all(&body) {
                    debug!("Judge stdin closed early: {}", e);
                }
            });
        }
        let stdout = child.stdout.take().map(read_to_end);
        let stderr = child.stderr.take().map(read_to_end);

        let status = self.wait_with_deadline(&mut child)?;
        let stdout = String::from_utf8_lossy(&collect(stdout)).into_owned();
        if !status.success() {
            let stderr = collect(stderr);
            return Err(JudgeError::Failed(format!(
                "{} exited with {}: {}",
                self.program,
                status,
                String::from_utf8_lossy(&stderr).trim()
            )));
        }

        let (ordered_ids, rationale) = parse_judge_output(&stdout)?;
        Ok(Judgment {
            ordered_ids,
            rationale,
            raw_output: stdout,
        })
    }
}

impl CommandJudge {
    /// Wait for exit, killing the program once the timeout passes
    fn wait_with_deadline(&self, child: &mut Child) -> Result<ExitStatus, JudgeError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => return Ok(status),
                Ok(None) => {}
                Err(e) => {
                    return Err(JudgeError::Failed(format!("failed to wait for {}: {}", self.program, e)))
                }
            }
            if Instant::now() >= deadline {
                if let Err(e) = child.kill() {
                    warn!("Failed to kill {}: {}", self.program, e);
                }
                let _ = child.wait();
                return Err(JudgeError::Failed(format!(
                    "{} timed out after {:.1}s",
                    self.program,
                    self.timeout.as_secs_f64()
                )));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

fn read_to_end<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            debug!("Judge output read failed: {}", e);
        }
        buf
    })
}

fn collect(reader: Option<JoinHandle<Vec<u8>>>) -> Vec<u8> {
    reader.and_then(|handle| handle.join().ok()).unwrap_or_default()
}

/// Extract the ordering and rationale from judge output
pub fn parse_judge_output(text: &str) -> Result<(Vec<ItemId>, String), JudgeError> {
    let reply = find_reply(text, 2).ok_or_else(|| {
        JudgeError::InvalidOutput(format!(
            "no JSON object with an 'ordered' array in output: {}",
            truncate(text, 200)
        ))
    })?;
    let rationale = reply.rationale.or(reply.rationale_top).unwrap_or_default();
    Ok((reply.ordered, rationale))
}

fn find_reply(text: &str, depth: usize) -> Option<JudgeReply> {
    for (start, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        let value = match stream.next() {
            Some(Ok(value)) => value,
            _ => continue,
        };
        let object = match value.as_object() {
            Some(object) => object,
            None => continue,
        };
        if object.contains_key("ordered") {
            if let Ok(reply) = serde_json::from_value::<JudgeReply>(value.clone()) {
                return Some(reply);
            }
        } else if depth > 0 {
            if let Some(Value::String(inner)) = object.get("result") {
                if let Some(reply) = find_reply(inner, depth - 1) {
                    return Some(reply);
                }
            }
        }
    }
    None
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}
