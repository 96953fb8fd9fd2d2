use burn::config::Config;
use burn::module::Module;
use burn::nn::{Linear, LinearConfig};
use burn::tensor::activation;
use burn::tensor::{backend::Backend, Tensor};
use rand::rngs::StdRng;

use crate::error::{ForecastError};
use crate::modules::dropout::{Dropout, DropoutConfig};
use crate::utils::{causal_mask, split};

/// Multi-head attention whose heads share a single value projection and are
/// averaged rather than concatenated, so the per-head weights can be read as
/// one attention map.
#[derive(Module, Debug)]
pub struct InterpretableMultiHeadAttention<B: Backend> {
    n_head: usize,
    d_head: usize,
    qkv_linears: Linear<B>,
    out_proj: Linear<B>,
    attn_dropout: Dropout,
    out_dropout: Dropout,
    mask: Tensor<B, 2>,
}

#[derive(Debug, Clone)]
pub struct AttentionOutput<B: Backend> {
    /// `[B, T, H]`
    pub output: Tensor<B, 3>,
    /// Per-head weighted values, `[B, M, T, d_head]`.
    pub attn_vec: Tensor<B, 4>,
    /// Attention probabilities, `[B, M, T, T]`.
    pub attn_prob: Tensor<B, 4>,
}

impl<B: Backend> InterpretableMultiHeadAttention<B> {
    /// `x`: `[B, T, H]` with `T` at most the example length.
    pub fn forward(
        &self,
        x: Tensor<B, 3>,
        mask_future_timesteps: bool,
        mut rng: Option<&mut StdRng>,
    ) -> AttentionOutput<B> {
        let [batch_size, seq_len, _] = x.dims();
        let (n_head, d_head) = (self.n_head, self.d_head);

        let qkv = self.qkv_linears.forward(x);
        let (q, k, v) = {
            let mut parts = split(qkv, &[n_head * d_head, n_head * d_head, d_head], -1);
            let q = parts.remove(0);
            let k = parts.remove(0);
            let v = parts.remove(0);
            (q, k, v)
        };

        // [B, T, M, Ad] -> [B, M, T, Ad]
        let q = q.reshape([batch_size, seq_len, n_head, d_head]).swap_dims(1, 2);
        // [B, T, M, Ad] -> [B, M, Ad, T]
        let k = k
            .reshape([batch_size, seq_len, n_head, d_head])
            .swap_dims(1, 2)
            .swap_dims(2, 3);
        // Shared by every head.
        let v: Tensor<B, 4> = v.unsqueeze_dim::<4>(1).repeat(1, n_head);

        let scale = (d_head as f64).powf(-0.5);
        let mut attn_score = q.matmul(k) * scale;

        if mask_future_timesteps {
            let mask: Tensor<B, 4> = self
                .mask
                .clone()
                .slice([0..seq_len, 0..seq_len])
                .reshape([1, 1, seq_len, seq_len])
                .repeat(0, batch_size)
                .repeat(1, n_head)
                .to_device(&attn_score.device());
            attn_score = attn_score + mask;
        }

        let attn_prob = activation::softmax(attn_score, 3);
        let attn_prob = self.attn_dropout.forward(attn_prob, rng.as_deref_mut());

        let attn_vec = attn_prob.clone().matmul(v);
        let m_attn_vec: Tensor<B, 3> = attn_vec.clone().mean_dim(1).squeeze(1);

        let output = self.out_proj.forward(m_attn_vec);
        let output = self.out_dropout.forward(output, rng);

        AttentionOutput {
            output,
            attn_vec,
            attn_prob,
        }
    }
}

#[derive(Config, Debug)]
pub struct InterpretableMultiHeadAttentionConfig {
    n_head: usize,
    d_hidden: usize,
    example_length: usize,

    #[config(default = 0.0)]
    attn_dropout: f64,

    #[config(default = 0.0)]
    dropout: f64,
}

impl InterpretableMultiHeadAttentionConfig {
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.n_head == 0 || self.d_hidden % self.n_head != 0 {
            return Err(ForecastError::HeadsNotDivisible {
                hidden_size: self.d_hidden,
                n_head: self.n_head,
            });
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self) -> InterpretableMultiHeadAttention<B> {
        assert!(
            self.validate().is_ok(),
            "hidden size must be divisible by the number of heads"
        );

        let d_head = self.d_hidden / self.n_head;

        InterpretableMultiHeadAttention {
            n_head: self.n_head,
            d_head,
            qkv_linears: LinearConfig::new(self.d_hidden, (2 * self.n_head + 1) * d_head)
                .with_bias(false)
                .init(),
            out_proj: LinearConfig::new(d_head, self.d_hidden)
                .with_bias(false)
                .init(),
            attn_dropout: DropoutConfig::new(self.attn_dropout).init(),
            out_dropout: DropoutConfig::new(self.dropout).init(),
            mask: causal_mask(self.example_length),
        }
    }
}
