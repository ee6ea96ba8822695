use async_trait::async_trait;
use dashmap::DashMap;
use rand::thread_rng;
use tensorpipe_core::JobId;
use tensorpipe_wire::{ChatMessage, DType, JobData, SamplingParams, TensorBlob};

use crate::error::{ModelError, Result};
use crate::sampling;
use crate::traits::{EmbedOutput, EndModel, HeadOutput, LayerModel, ModelStep};

const EOS_TOKEN: i64 = 256;
const VOCAB_SIZE: usize = 257;

/// A byte-level, hash-derived model backend with no learned weights. It tokenizes text
/// to its UTF-8 bytes, embeds each byte via a keyed hash expansion, and samples from
/// logits computed as the dot product of the final hidden state against every token's
/// embedding. It exercises the full job pipeline end to end (shapes, masks, KV-cache
/// lifecycle, sampling) without requiring a real set of model weights; a real
/// candle-backed implementation of the same two traits is a drop-in replacement.
pub struct ReferenceEndModel {
    hidden_size: usize,
}

impl ReferenceEndModel {
    pub fn new(hidden_size: usize) -> Self {
        Self { hidden_size }
    }

    fn embed_vector(&self, token_id: i64) -> Vec<f32> {
        embed_vector(token_id, self.hidden_size)
    }
}

fn embed_vector(token_id: i64, hidden_size: usize) -> Vec<f32> {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&token_id.to_le_bytes());
    let mut xof = hasher.finalize_xof();
    let mut buf = vec![0u8; hidden_size];
    xof.fill(&mut buf);
    buf.into_iter().map(|b| (b as f32 / 255.0) - 0.5).collect()
}

fn tensor_from_f32(shape: Vec<usize>, values: &[f32]) -> Result<TensorBlob> {
    let mut data = Vec::with_capacity(values.len() * 4);
    for v in values {
        data.extend_from_slice(&v.to_le_bytes());
    }
    TensorBlob::new(DType::F32, shape, data).map_err(|e| ModelError::Forward(e.to_string()))
}

fn tensor_from_i64(shape: Vec<usize>, values: &[i64]) -> Result<TensorBlob> {
    let mut data = Vec::with_capacity(values.len() * 8);
    for v in values {
        data.extend_from_slice(&v.to_le_bytes());
    }
    TensorBlob::new(DType::I64, shape, data).map_err(|e| ModelError::Forward(e.to_string()))
}

fn f32_values(blob: &TensorBlob) -> Vec<f32> {
    blob.data
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[async_trait]
impl EndModel for ReferenceEndModel {
    fn tokenize(&self, messages: &[ChatMessage]) -> Result<Vec<i64>> {
        let mut ids = Vec::new();
        for message in messages {
            ids.extend(message.content.bytes().map(|b| b as i64));
        }
        if ids.is_empty() {
            return Err(ModelError::Tokenization("no input text".to_string()));
        }
        Ok(ids)
    }

    async fn compute_embed(
        &self,
        step: &ModelStep<'_>,
        range: (usize, usize),
    ) -> Result<EmbedOutput> {
        let (start, end) = range;
        let slice = &step.input_ids[start..end];
        let seq_len = slice.len().max(1);

        let mut state = Vec::with_capacity(seq_len * self.hidden_size);
        for &token_id in slice {
            state.extend(self.embed_vector(token_id));
        }

        let positions: Vec<i64> = (start as i64..(start + seq_len) as i64).collect();
        let causal_mask = vec![1.0f32; seq_len * seq_len];
        let rotary: Vec<f32> = (0..seq_len)
            .flat_map(|p| {
                let angle = p as f32;
                vec![angle.cos(), angle.sin()]
            })
            .collect();

        let mut data = JobData::default();
        data.state = Some(tensor_from_f32(vec![1, seq_len, self.hidden_size], &state)?);
        data.position_ids = Some(tensor_from_i64(vec![1, seq_len], &positions)?);
        data.cache_position = Some(tensor_from_i64(vec![1, seq_len], &positions)?);
        data.causal_mask = Some(tensor_from_f32(vec![1, 1, seq_len, seq_len], &causal_mask)?);
        data.position_embeddings = Some(tensor_from_f32(vec![2, seq_len], &rotary)?);

        Ok(EmbedOutput { data })
    }

    async fn compute_norm(&self, data: &mut JobData) -> Result<()> {
        let blob = data
            .state
            .as_mut()
            .ok_or(ModelError::MissingTensor("state"))?;
        let hidden = self.hidden_size;
        let mut values = f32_values(blob);
        for row in values.chunks_mut(hidden) {
            let mean_sq: f32 = row.iter().map(|v| v * v).sum::<f32>() / hidden as f32;
            let scale = 1.0 / (mean_sq + 1e-6).sqrt();
            for v in row.iter_mut() {
                *v *= scale;
            }
        }
        *blob = tensor_from_f32(blob.shape.clone(), &values)?;
        Ok(())
    }

    async fn compute_head(
        &self,
        data: &JobData,
        input_ids: &[i64],
        sampling_params: &SamplingParams,
    ) -> Result<HeadOutput> {
        let blob = data.state.as_ref().ok_or(ModelError::MissingTensor("state"))?;
        let values = f32_values(blob);
        let last_row = &values[values.len() - self.hidden_size..];

        let mut logits = vec![0.0f32; VOCAB_SIZE];
        for (token_id, logit) in logits.iter_mut().enumerate() {
            let embedding = embed_vector(token_id as i64, self.hidden_size);
            *logit = last_row
                .iter()
                .zip(embedding.iter())
                .map(|(a, b)| a * b)
                .sum();
        }

        let mut rng = thread_rng();
        let sampled = sampling::sample(&mut logits, input_ids, sampling_params, &mut rng);
        Ok(HeadOutput {
            sampled_token: sampled as i64,
            is_eos: sampled as i64 == EOS_TOKEN,
        })
    }

    fn set_result(&self, input_ids: &[i64], prompt_tokens: u32) -> Result<String> {
        let generated: Vec<u8> = input_ids[prompt_tokens as usize..]
            .iter()
            .filter(|&&id| id != EOS_TOKEN)
            .map(|&id| id as u8)
            .collect();
        Ok(String::from_utf8_lossy(&generated).into_owned())
    }

    fn eos_token_id(&self) -> i64 {
        EOS_TOKEN
    }

    fn num_hidden_layers(&self) -> u32 {
        0
    }
}

/// Deterministic layer backend: each layer XORs the state bytes with its own index.
/// Reversible, cheap, and enough to prove the FSM actually drives data through every
/// layer in order without claiming to be a real transformer block.
pub struct ReferenceLayerModel {
    cache: DashMap<JobId, ()>,
}

impl ReferenceLayerModel {
    pub fn new() -> Self {
        Self {
            cache: DashMap::new(),
        }
    }
}

impl Default for ReferenceLayerModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LayerModel for ReferenceLayerModel {
    async fn process_job(
        &self,
        job_id: JobId,
        data: &mut JobData,
        start_layer: u32,
        end_layer: u32,
    ) -> Result<()> {
        let blob = data
            .state
            .as_mut()
            .ok_or(ModelError::MissingTensor("state"))?;
        self.cache.insert(job_id, ());
        for layer in start_layer..=end_layer {
            let marker = (layer % 255) as u8;
            for byte in blob.data.iter_mut() {
                *byte ^= marker;
            }
        }
        Ok(())
    }

    fn clear_cache(&self, job_id: JobId) {
        self.cache.remove(&job_id);
    }
}
