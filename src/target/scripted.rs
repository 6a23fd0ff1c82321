//! In-memory transport for unit tests
//!
//! Responses are matched by substring, in registration order. Several
//! responses for the same needle are served one after another and the last
//! one repeats.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use crate::error::Result;
use crate::models::CommandOutput;
use crate::target::Transport;

#[derive(Debug, Clone)]
struct Response {
    delay: Option<Duration>,
    output: CommandOutput,
}

#[derive(Debug)]
struct Rule {
    needle: String,
    responses: VecDeque<Response>,
}

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    rules: Mutex<Vec<Rule>>,
    executed: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, needle: &str, exit_code: i32, output: &str) -> Self {
        self.push(needle, None, exit_code, output)
    }

    pub fn on_delayed(self, needle: &str, delay: Duration, exit_code: i32, output: &str) -> Self {
        self.push(needle, Some(delay), exit_code, output)
    }

    fn push(self, needle: &str, delay: Option<Duration>, exit_code: i32, output: &str) -> Self {
        let response = Response {
            delay,
            output: CommandOutput {
                exit_code,
                output: output.to_string(),
            },
        };
        {
            let mut rules = self.rules.lock().unwrap();
            match rules.iter_mut().find(|r| r.needle == needle) {
                Some(rule) => rule.responses.push_back(response),
                None => rules.push(Rule {
                    needle: needle.to_string(),
                    responses: VecDeque::from([response]),
                }),
            }
        }
        self
    }

    /// Every script executed so far
    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }

    /// How many executed scripts contain `needle`
    pub fn count(&self, needle: &str) -> usize {
        self.executed().iter().filter(|s| s.contains(needle)).count()
    }

    fn respond(&self, script: &str) -> Response {
        self.executed.lock().unwrap().push(script.to_string());

        let mut rules = self.rules.lock().unwrap();
        match rules.iter_mut().find(|r| script.contains(&r.needle)) {
            Some(rule) if rule.responses.len() > 1 => rule.responses.pop_front().unwrap(),
            Some(rule) => rule.responses[0].clone(),
            None => Response {
                delay: None,
                output: CommandOutput {
                    exit_code: 127,
                    output: format!("sh: {}: not found\n", script),
                },
            },
        }
    }
}

impl Transport for ScriptedTransport {
    async fn execute(&self, script: &str) -> Result<CommandOutput> {
        let response = self.respond(script);
        if let Some(delay) = response.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(response.output)
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
