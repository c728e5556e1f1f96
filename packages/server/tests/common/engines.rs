//! Conversation engines for driving the server in tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_core::kernel::{BaseConversationEngine, ChatInput, FinalState, RunConfig};
use anyhow::{anyhow, Result};
use async_stream::stream;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use session_lane::Chunk;

/// One step of a scripted reply.
#[derive(Clone)]
pub enum Step {
    Emit(Chunk),
    Fail(String),
    Sleep(Duration),
    /// Never yield again.
    Hang,
}

/// Plays back the same script for every request and records what it saw.
pub struct ScriptedEngine {
    script: Vec<Step>,
    calls: AtomicUsize,
    log: Arc<Mutex<Vec<String>>>,
    dropped: Arc<AtomicBool>,
}

impl ScriptedEngine {
    pub fn new(script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            script,
            calls: AtomicUsize::new(0),
            log: Arc::default(),
            dropped: Arc::default(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `start:<message>` / `end:<message>` entries in execution order.
    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// True once a stream was dropped before finishing its script.
    pub fn saw_early_drop(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }
}

/// Flags the engine when a stream is dropped mid-script.
struct DropFlag {
    flag: Arc<AtomicBool>,
    finished: bool,
}

impl Drop for DropFlag {
    fn drop(&mut self) {
        if !self.finished {
            self.flag.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl BaseConversationEngine for ScriptedEngine {
    async fn invoke(&self, input: ChatInput, config: RunConfig) -> Result<FinalState> {
        let session_key = config.session_key.clone();
        let mut reply = String::new();
        let mut chunks = self.stream(input, config);
        while let Some(chunk) = chunks.next().await {
            if let Some(text) = chunk?.content().as_str() {
                reply.push_str(text);
            }
        }
        Ok(FinalState {
            session_key,
            reply,
            turns: 0,
        })
    }

    fn stream(&self, input: ChatInput, _config: RunConfig) -> BoxStream<'static, Result<Chunk>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let script = self.script.clone();
        let message = input.message;
        let log = self.log.clone();
        let flag = self.dropped.clone();

        Box::pin(stream! {
            let mut guard = DropFlag { flag, finished: false };
            log.lock().unwrap().push(format!("start:{}", message));

            for step in script {
                match step {
                    Step::Emit(chunk) => yield Ok(chunk),
                    Step::Fail(reason) => {
                        log.lock().unwrap().push(format!("end:{}", message));
                        guard.finished = true;
                        yield Err(anyhow!(reason));
                        return;
                    }
                    Step::Sleep(duration) => tokio::time::sleep(duration).await,
                    Step::Hang => futures::future::pending::<()>().await,
                }
            }

            log.lock().unwrap().push(format!("end:{}", message));
            guard.finished = true;
        })
    }
}
