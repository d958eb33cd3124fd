//! Reply scheduling for accepted messages.
//!
//! Each sender gets its own queue and worker so a slow completion for one
//! contact never delays another, while one contact's messages are answered
//! in the order they arrived. In sequential mode every message shares one
//! queue.

use std::{collections::HashMap, sync::Arc, time::Duration};

use {
    tokio::{
        sync::{Mutex, mpsc},
        task::JoinSet,
    },
    tracing::{debug, info, warn},
};

use {
    wabridge_channels::{ReplyGenerator, Result, SendReceipt},
    wabridge_config::DispatchMode,
};

use crate::session::SessionOutbound;

#[derive(Debug)]
struct Job {
    sender: String,
    text: String,
}

struct Queue {
    tx: mpsc::UnboundedSender<Job>,
    /// Held by the worker draining this queue; a replacement worker waits
    /// for it so a sender's replies never overtake each other.
    turn: Arc<Mutex<()>>,
}

pub struct Dispatcher {
    mode: DispatchMode,
    idle: Duration,
    generator: Arc<dyn ReplyGenerator>,
    outbound: Arc<SessionOutbound>,
    queues: HashMap<String, Queue>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(
        mode: DispatchMode,
        idle: Duration,
        generator: Arc<dyn ReplyGenerator>,
        outbound: Arc<SessionOutbound>,
    ) -> Self {
        Self {
            mode,
            idle,
            generator,
            outbound,
            queues: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    /// Queue a reply for `sender`. Never blocks the event loop.
    pub fn submit(&mut self, sender: String, text: String) {
        while self.workers.try_join_next().is_some() {}

        let key = match self.mode {
            DispatchMode::PerSender => sender.clone(),
            DispatchMode::Sequential => String::new(),
        };
        let mut job = Job { sender, text };

        let turn = match self.queues.get(&key) {
            Some(queue) => match queue.tx.send(job) {
                Ok(()) => return,
                // The worker went idle and closed its queue.
                Err(mpsc::error::SendError(returned)) => {
                    job = returned;
                    Arc::clone(&queue.turn)
                },
            },
            None => Arc::new(Mutex::new(())),
        };

        let (tx, rx) = mpsc::unbounded_channel();
        // `rx` is alive, the send cannot fail.
        let _ = tx.send(job);
        debug!(queue = %key, "starting reply worker");
        self.workers.spawn(worker(
            rx,
            Arc::clone(&turn),
            self.idle,
            Arc::clone(&self.generator),
            Arc::clone(&self.outbound),
        ));
        self.queues.insert(key, Queue { tx, turn });
        self.prune();
    }

    /// Drop bookkeeping for queues whose worker has exited.
    fn prune(&mut self) {
        self.queues
            .retain(|_, q| !q.tx.is_closed() || Arc::strong_count(&q.turn) > 1);
    }

    /// Abort every worker, dropping in-flight completions.
    pub async fn shutdown(mut self) {
        self.queues.clear();
        self.workers.shutdown().await;
    }
}

async fn worker(
    mut rx: mpsc::UnboundedReceiver<Job>,
    turn: Arc<Mutex<()>>,
    idle: Duration,
    generator: Arc<dyn ReplyGenerator>,
    outbound: Arc<SessionOutbound>,
) {
    let _turn = turn.lock_owned().await;
    loop {
        let job = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => {
                rx.close();
                while let Ok(job) = rx.try_recv() {
                    if !handle(job, generator.as_ref(), &outbound).await {
                        return;
                    }
                }
                break;
            },
        };
        if !handle(job, generator.as_ref(), &outbound).await {
            return;
        }
    }
}

/// Generate and send one reply. Returns `false` once the session is gone.
async fn handle(job: Job, generator: &dyn ReplyGenerator, outbound: &SessionOutbound) -> bool {
    let reply = tokio::select! {
        biased;
        _ = outbound.closed() => return false,
        reply = generator.generate_reply(&job.text) => reply,
    };
    match deliver(outbound, &job.sender, &reply).await {
        Err(e) if e.is_session_closed() => false,
        _ => true,
    }
}

/// Send `text` to `to`, logging the outcome. Failed sends are not retried.
pub async fn deliver(outbound: &SessionOutbound, to: &str, text: &str) -> Result<SendReceipt> {
    let result = outbound.send_text(to, text).await;
    match &result {
        Ok(receipt) => info!(
            to,
            generation = outbound.generation(),
            message_id = receipt.message_id.as_deref().unwrap_or(""),
            "reply sent"
        ),
        Err(e) if e.is_session_closed() => {
            debug!(to, generation = outbound.generation(), "session closed, reply dropped")
        },
        Err(e) => warn!(to, generation = outbound.generation(), error = %e, "failed to send reply"),
    }
    result
}
