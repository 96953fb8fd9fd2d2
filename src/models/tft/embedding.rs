use burn::config::Config;
use burn::module::{Module, Param};
use burn::tensor::{backend::Backend, Distribution, Tensor};

/// When a channel's values become known relative to the forecast time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Static,
    Future,
    Historical,
    Target,
}

/// Affine embedding of `count` continuous variables: variable `i` with value
/// `v` maps to `v * vectors[i] + bias[i]`.
#[derive(Module, Debug)]
pub struct ChannelEmbedding<B: Backend> {
    vectors: Param<Tensor<B, 2>>, // [count, H]
    bias: Param<Tensor<B, 2>>,    // [count, H]
}

impl<B: Backend> ChannelEmbedding<B> {
    fn new(count: usize, d_hidden: usize) -> Self {
        // Xavier normal, fan_in = d_hidden, fan_out = count.
        let std = (2.0 / (count + d_hidden) as f64).sqrt();
        let vectors = Tensor::random([count, d_hidden], Distribution::Normal(0.0, std));

        Self {
            vectors: Param::from(vectors),
            bias: Param::from(Tensor::zeros([count, d_hidden])),
        }
    }

    pub fn count(&self) -> usize {
        self.vectors.val().dims()[0]
    }

    /// `[B, F]` -> `[B, F, H]`
    pub fn embed_static(&self, x: Tensor<B, 2>) -> Tensor<B, 3> {
        let [count, d_hidden] = self.vectors.val().dims();
        let vectors: Tensor<B, 3> = self.vectors.val().reshape([1, count, d_hidden]);
        let bias: Tensor<B, 3> = self.bias.val().reshape([1, count, d_hidden]);

        let x: Tensor<B, 3> = x.unsqueeze_dim::<3>(2).repeat(2, d_hidden);
        x * vectors + bias
    }

    /// `[B, T, F]` -> `[B, T, F, H]`
    pub fn embed_temporal(&self, x: Tensor<B, 3>) -> Tensor<B, 4> {
        let [count, d_hidden] = self.vectors.val().dims();
        let vectors: Tensor<B, 4> = self.vectors.val().reshape([1, 1, count, d_hidden]);
        let bias: Tensor<B, 4> = self.bias.val().reshape([1, 1, count, d_hidden]);

        let x: Tensor<B, 4> = x.unsqueeze_dim::<4>(3).repeat(3, d_hidden);
        x * vectors + bias
    }
}

/// Per-channel embeddings into the shared hidden size. Channels configured
/// with zero variables own no parameters.
#[derive(Module, Debug)]
pub struct TftEmbedding<B: Backend> {
    stat: Option<ChannelEmbedding<B>>,
    futr: Option<ChannelEmbedding<B>>,
    hist: Option<ChannelEmbedding<B>>,
    tgt: ChannelEmbedding<B>,
}

/// Embedded channels of one batch. Absent inputs stay `None`.
#[derive(Debug, Clone)]
pub struct EmbeddedInputs<B: Backend> {
    pub stat: Option<Tensor<B, 3>>, // [B, S, H]
    pub futr: Option<Tensor<B, 4>>, // [B, L + h, K, H]
    pub hist: Option<Tensor<B, 4>>, // [B, L, O, H]
    pub tgt: Tensor<B, 4>,          // [B, L, Z, H]
}

impl<B: Backend> TftEmbedding<B> {
    pub fn channel(&self, kind: ChannelKind) -> Option<&ChannelEmbedding<B>> {
        match kind {
            ChannelKind::Static => self.stat.as_ref(),
            ChannelKind::Future => self.futr.as_ref(),
            ChannelKind::Historical => self.hist.as_ref(),
            ChannelKind::Target => Some(&self.tgt),
        }
    }

    pub fn forward(
        &self,
        target: Tensor<B, 3>,
        stat_exog: Option<Tensor<B, 2>>,
        futr_exog: Option<Tensor<B, 3>>,
        hist_exog: Option<Tensor<B, 3>>,
    ) -> EmbeddedInputs<B> {
        EmbeddedInputs {
            stat: Self::apply(self.channel(ChannelKind::Static), stat_exog, |emb, x| {
                emb.embed_static(x)
            }),
            futr: Self::apply(self.channel(ChannelKind::Future), futr_exog, |emb, x| {
                emb.embed_temporal(x)
            }),
            hist: Self::apply(self.channel(ChannelKind::Historical), hist_exog, |emb, x| {
                emb.embed_temporal(x)
            }),
            tgt: self.tgt.embed_temporal(target),
        }
    }

    fn apply<const D: usize, const D2: usize>(
        embedding: Option<&ChannelEmbedding<B>>,
        input: Option<Tensor<B, D>>,
        embed: impl Fn(&ChannelEmbedding<B>, Tensor<B, D>) -> Tensor<B, D2>,
    ) -> Option<Tensor<B, D2>> {
        match (embedding, input) {
            (Some(embedding), Some(input)) => Some(embed(embedding, input)),
            _ => None,
        }
    }
}

#[derive(Config, Debug)]
pub struct TftEmbeddingConfig {
    d_hidden: usize,

    #[config(default = 0)]
    stat_input_size: usize,

    #[config(default = 0)]
    futr_input_size: usize,

    #[config(default = 0)]
    hist_input_size: usize,

    #[config(default = 1)]
    tgt_size: usize,
}

impl TftEmbeddingConfig {
    pub fn init<B: Backend>(&self) -> TftEmbedding<B> {
        assert!(self.tgt_size > 0, "at least one target is required");

        let channel = |count: usize| {
            if count > 0 {
                Some(ChannelEmbedding::new(count, self.d_hidden))
            } else {
                None
            }
        };

        TftEmbedding {
            stat: channel(self.stat_input_size),
            futr: channel(self.futr_input_size),
            hist: channel(self.hist_input_size),
            tgt: ChannelEmbedding::new(self.tgt_size, self.d_hidden),
        }
    }
}
