use std::sync::Arc;

use tensorpipe_model::ModelStep;
use tensorpipe_topology::Pipe;
use tensorpipe_wire::{ComputeStep, LayerJob};
use tracing::{debug, info, warn};

use crate::context::JobContext;
use crate::error::JobOutcome;
use crate::job::{Job, JobStatus};

/// Where the pipe view says the next layer lives, from this node's perspective.
enum NextHop {
    Missing,
    Virtual,
    Local,
}

fn next_hop(pipe: &Pipe, layer: u32) -> NextHop {
    match pipe.get_layer(layer, false) {
        None => NextHop::Missing,
        Some(segment) if segment.is_virtual() => NextHop::Virtual,
        Some(_) => NextHop::Local,
    }
}

/// One local state of a job's pass on this node. Distinct from `ComputeStep`, which is
/// the persisted, wire-carried cursor: `Validating`, `Send` and `Done` never leave this
/// node and are never written to an envelope.
#[derive(Debug)]
enum FsmState {
    Validating,
    Embed { first_chunk: bool },
    ProcessLayers,
    Head,
    Send,
    Done,
}

/// Runs one job's pass to completion: from the moment an envelope is dequeued by the
/// receiver to either a successful hand-off back onto the wire, local completion, or a
/// logged, silent drop. Never returns an `Err` that the caller needs to propagate to a
/// client; every caller-visible failure goes through the tracker's `resolve` callback.
pub struct JobProcessor;

impl JobProcessor {
    pub async fn run(ctx: Arc<JobContext>, envelope: LayerJob) {
        let job_id = envelope.job_id;
        ctx.tracker.touch(job_id);

        let mut job = match ctx.tracker.get(job_id) {
            Some(pending) => {
                let mut tracked = pending.job.read().clone();
                merge_envelope(&mut tracked, &envelope);
                tracked
            }
            None => Job::from_layer_job(envelope),
        };

        let mut state = FsmState::Validating;
        loop {
            state = match state {
                FsmState::Validating => Self::validating(&ctx, &mut job).await,
                FsmState::Embed { first_chunk } => Self::embed(&ctx, &mut job, first_chunk).await,
                FsmState::ProcessLayers => Self::process_layers(&ctx, &mut job).await,
                FsmState::Head => Self::head(&ctx, &mut job).await,
                FsmState::Send => Self::send(&ctx, &job).await,
                FsmState::Done => break,
            };
        }

        if let Some(pending) = ctx.tracker.get(job_id) {
            *pending.job.write() = job;
        }
    }

    async fn validating(ctx: &Arc<JobContext>, job: &mut Job) -> FsmState {
        let pipe = match ctx.pipes.get(&job.pipe_id) {
            Some(pipe) => pipe,
            None => {
                warn!(job_id = %job.job_id, "pipe missing, dropping job");
                return FsmState::Done;
            }
        };
        if !pipe.is_complete() {
            warn!(job_id = %job.job_id, pipe_id = %job.pipe_id, "pipe incomplete, dropping job");
            return FsmState::Done;
        }

        if job.compute_step == ComputeStep::Tokenize {
            if job.origin_node_id != ctx.self_node_id {
                warn!(job_id = %job.job_id, "tokenize step arrived at a non-origin node");
                return FsmState::Done;
            }
            let Some(end_model) = &ctx.end_model else {
                warn!(job_id = %job.job_id, "no end model resident to tokenize");
                return FsmState::Done;
            };
            match end_model.tokenize(&job.messages) {
                Ok(ids) => {
                    job.prompt_tokens = ids.len() as u32;
                    job.input_ids = ids;
                    job.chunking.init(job.prompt_tokens, ctx.prefill_chunk_size);
                    job.compute_step = ComputeStep::Embed;
                }
                Err(e) => {
                    warn!(job_id = %job.job_id, error = %e, "tokenize failed");
                    return FsmState::Done;
                }
            }
            return FsmState::Embed { first_chunk: true };
        }

        if job.compute_step == ComputeStep::Head {
            if job.origin_node_id != ctx.self_node_id {
                debug!(job_id = %job.job_id, "head-stepped envelope arrived at non-origin node, dropping");
                return FsmState::Done;
            }
            if ctx.end_model.is_none() {
                warn!(job_id = %job.job_id, "no end model resident to run head");
                return FsmState::Done;
            }
        }

        if matches!(job.compute_step, ComputeStep::Head | ComputeStep::Embed)
            && job.origin_node_id == ctx.self_node_id
        {
            let more_chunks = job.chunking.is_active() && job.chunking.has_more();
            return if more_chunks {
                FsmState::Embed { first_chunk: false }
            } else {
                match job.compute_step {
                    ComputeStep::Head => FsmState::Head,
                    _ => FsmState::Embed { first_chunk: false },
                }
            };
        }

        match next_hop(&pipe, job.current_layer) {
            NextHop::Missing => {
                warn!(job_id = %job.job_id, layer = job.current_layer, "no segment owns this layer");
                FsmState::Done
            }
            NextHop::Virtual => FsmState::Send,
            NextHop::Local => FsmState::ProcessLayers,
        }
    }

    async fn embed(ctx: &Arc<JobContext>, job: &mut Job, first_chunk: bool) -> FsmState {
        let Some(end_model) = &ctx.end_model else {
            warn!(job_id = %job.job_id, "no end model resident to embed");
            return FsmState::Done;
        };

        let range = if job.current_token == 0 {
            if job.chunking.is_active() && !first_chunk && !job.restart && job.chunking.has_more() {
                job.chunking.advance();
            }
            let (start, end) = job.chunking.get_range();
            (start as usize, end as usize)
        } else {
            let last = job.input_ids.len() - 1;
            (last, last + 1)
        };
        job.restart = false;

        let step = ModelStep {
            input_ids: &job.input_ids,
            prompt_tokens: job.prompt_tokens,
            current_token: job.current_token,
            data: job.data.clone(),
        };
        match end_model.compute_embed(&step, range).await {
            Ok(output) => job.data = output.data,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "embed failed");
                return FsmState::Done;
            }
        }
        job.delta.clear();
        job.compute_step = ComputeStep::Layer;
        job.current_layer = 0;

        if !sync_and_notify(ctx, job) {
            return FsmState::Done;
        }

        let Some(pipe) = ctx.pipes.get(&job.pipe_id) else {
            return FsmState::Done;
        };
        match next_hop(&pipe, 0) {
            NextHop::Missing => FsmState::Done,
            NextHop::Virtual => FsmState::Send,
            NextHop::Local => FsmState::ProcessLayers,
        }
    }

    async fn process_layers(ctx: &Arc<JobContext>, job: &mut Job) -> FsmState {
        let Some(pipe) = ctx.pipes.get(&job.pipe_id) else {
            return FsmState::Done;
        };
        let Some(segment) = pipe.get_layer(job.current_layer, true) else {
            warn!(job_id = %job.job_id, layer = job.current_layer, "local segment missing");
            return FsmState::Done;
        };
        let Some(layer_model) = &ctx.layer_model else {
            warn!(job_id = %job.job_id, "no layer model resident to process layers");
            return FsmState::Done;
        };

        let (start_layer, end_layer) = (segment.start_layer(), segment.end_layer());
        if let Err(e) = layer_model
            .process_job(job.job_id, &mut job.data, start_layer, end_layer)
            .await
        {
            warn!(job_id = %job.job_id, error = %e, "layer forward failed");
            return FsmState::Done;
        }
        ctx.tracker.touch(job.job_id);
        job.current_layer = end_layer + 1;

        if job.current_layer == pipe.num_hidden_layers {
            if job.origin_node_id != ctx.self_node_id {
                job.compute_step = ComputeStep::Head;
                return FsmState::Send;
            }
            if job.current_token == 0 && job.chunking.has_more() {
                return FsmState::Embed { first_chunk: false };
            }
            job.compute_step = ComputeStep::Head;
            return FsmState::Head;
        }

        match next_hop(&pipe, job.current_layer) {
            NextHop::Missing => {
                warn!(job_id = %job.job_id, layer = job.current_layer, "no segment owns this layer");
                FsmState::Done
            }
            NextHop::Virtual => FsmState::Send,
            NextHop::Local => FsmState::ProcessLayers,
        }
    }

    async fn head(ctx: &Arc<JobContext>, job: &mut Job) -> FsmState {
        let Some(end_model) = &ctx.end_model else {
            warn!(job_id = %job.job_id, "no end model resident to run head");
            return FsmState::Done;
        };

        if job.current_token == 0 {
            if job.chunking.is_active() && job.chunking.has_more() {
                warn!(job_id = %job.job_id, "reached head with prefill chunks still pending");
                return FsmState::Done;
            }
            job.chunking.disable();
            info!(job_id = %job.job_id, prompt_tokens = job.prompt_tokens, "prefill complete");
        }

        if let Err(e) = end_model.compute_norm(&mut job.data).await {
            warn!(job_id = %job.job_id, error = %e, "norm failed");
            return FsmState::Done;
        }

        let output = match end_model
            .compute_head(&job.data, &job.input_ids, &job.sampling)
            .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(job_id = %job.job_id, error = %e, "head failed");
                return FsmState::Done;
            }
        };

        job.input_ids.push(output.sampled_token);
        job.current_token += 1;
        job.delta = end_model
            .set_result(&[output.sampled_token], 0)
            .unwrap_or_default();

        let finished = output.is_eos || job.current_token == job.max_completion_tokens;
        if finished {
            job.status = JobStatus::Completed;
            let result = end_model
                .set_result(&job.input_ids, job.prompt_tokens)
                .unwrap_or_default();
            job.result = Some(result.clone());
            ctx.tracker
                .complete(job.job_id, JobOutcome::Completed { result });
            return FsmState::Done;
        }

        if !sync_and_notify(ctx, job) {
            return FsmState::Done;
        }
        job.compute_step = ComputeStep::Embed;
        FsmState::Embed { first_chunk: false }
    }

    async fn send(ctx: &Arc<JobContext>, job: &Job) -> FsmState {
        let Some(pipe) = ctx.pipes.get(&job.pipe_id) else {
            return FsmState::Done;
        };
        let dest = if job.compute_step == ComputeStep::Head {
            job.origin_node_id
        } else {
            match pipe.get_layer(job.current_layer, false) {
                Some(segment) => segment.node_id(),
                None => {
                    warn!(job_id = %job.job_id, "no destination for send");
                    return FsmState::Done;
                }
            }
        };

        let envelope = job.to_layer_job();
        if let Err(e) = ctx.transport.send_job(&envelope, dest).await {
            warn!(job_id = %job.job_id, dest = %dest, error = %e, "send failed, relying on staleness sweep to recover");
        }
        FsmState::Done
    }
}

/// Publishes the pass's current state to the tracker before notifying, so an observer
/// reacting to `on_update` sees the token/delta that was just produced rather than
/// whatever was last written back at the end of a previous pass.
fn sync_and_notify(ctx: &Arc<JobContext>, job: &Job) -> bool {
    if let Some(pending) = ctx.tracker.get(job.job_id) {
        *pending.job.write() = job.clone();
    }
    ctx.tracker.send_update(job.job_id)
}

fn merge_envelope(job: &mut Job, envelope: &LayerJob) {
    job.input_ids = envelope.input_ids.clone();
    job.prompt_tokens = envelope.prompt_tokens;
    job.current_token = envelope.current_token;
    job.max_completion_tokens = envelope.max_completion_tokens;
    job.sampling = envelope.sampling;
    job.compute_step = envelope.compute_step;
    job.current_layer = envelope.current_layer;
    job.data = envelope.data.clone();
    job.restart = envelope.restart;
}
