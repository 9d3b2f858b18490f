//! ResNet-18 image classifier with a replaceable head.

use burn::module::Param;
use burn::nn::{
    conv::{Conv2d, Conv2dConfig},
    pool::{AdaptiveAvgPool2d, AdaptiveAvgPool2dConfig, MaxPool2d, MaxPool2dConfig},
    Linear, LinearConfig, PaddingConfig2d, Relu,
};
use burn::prelude::*;
use corrode_core::{CamClassifier, TargetLayer, N_CLASSES};
use serde::{Deserialize, Serialize};

/// Configuration for the ResNet classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResNetConfig {
    /// Number of input channels.
    pub in_channels: usize,
    /// Number of output classes.
    pub n_classes: usize,
    /// Output channels of the stem and of each of the four stages.
    pub stage_channels: [usize; 4],
    /// Residual blocks per stage.
    pub blocks_per_stage: [usize; 4],
}

impl Default for ResNetConfig {
    fn default() -> Self {
        Self::resnet18(N_CLASSES)
    }
}

impl ResNetConfig {
    /// Standard ResNet-18 layout with an `n_classes` head.
    pub fn resnet18(n_classes: usize) -> Self {
        Self {
            in_channels: 3,
            n_classes,
            stage_channels: [64, 128, 256, 512],
            blocks_per_stage: [2, 2, 2, 2],
        }
    }

    /// Set the stage widths.
    #[must_use]
    pub fn with_stage_channels(mut self, stage_channels: [usize; 4]) -> Self {
        self.stage_channels = stage_channels;
        self
    }

    /// Set the number of blocks per stage.
    #[must_use]
    pub fn with_blocks_per_stage(mut self, blocks_per_stage: [usize; 4]) -> Self {
        self.blocks_per_stage = blocks_per_stage;
        self
    }

    /// Channels entering the linear head.
    pub fn feature_channels(&self) -> usize {
        self.stage_channels[3]
    }

    /// Initialize the model.
    pub fn init<B: Backend>(&self, device: &B::Device) -> ResNet<B> {
        ResNet::new(self.clone(), device)
    }
}

/// Batch normalization with fixed statistics.
///
/// Always normalizes with the running mean and variance, whatever the
/// backend, so the network gives the same scores with or without gradient
/// tracking.
#[derive(Module, Debug)]
pub struct FrozenBatchNorm<B: Backend> {
    /// Scale.
    pub gamma: Param<Tensor<B, 1>>,
    /// Shift.
    pub beta: Param<Tensor<B, 1>>,
    /// Running mean.
    pub running_mean: Param<Tensor<B, 1>>,
    /// Running variance.
    pub running_var: Param<Tensor<B, 1>>,
    epsilon: f64,
}

impl<B: Backend> FrozenBatchNorm<B> {
    /// Identity normalization over `channels` channels.
    pub fn new(channels: usize, device: &B::Device) -> Self {
        Self {
            gamma: Param::from_tensor(Tensor::ones([channels], device)),
            beta: Param::from_tensor(Tensor::zeros([channels], device)),
            running_mean: Param::from_tensor(Tensor::zeros([channels], device)),
            running_var: Param::from_tensor(Tensor::ones([channels], device)),
            epsilon: 1e-5,
        }
    }

    /// Forward pass over (batch, channels, h, w).
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let [_, channels, _, _] = x.dims();

        let scale = self.gamma.val() / (self.running_var.val() + self.epsilon).sqrt();
        let shift = self.beta.val() - self.running_mean.val() * scale.clone();

        x * scale.reshape([1, channels, 1, 1]) + shift.reshape([1, channels, 1, 1])
    }
}

/// Two 3×3 convolutions with an identity or projected skip connection.
#[derive(Module, Debug)]
pub struct BasicBlock<B: Backend> {
    conv1: Conv2d<B>,
    bn1: FrozenBatchNorm<B>,
    conv2: Conv2d<B>,
    bn2: FrozenBatchNorm<B>,
    downsample: Option<Conv2d<B>>,
    downsample_bn: Option<FrozenBatchNorm<B>>,
}

impl<B: Backend> BasicBlock<B> {
    /// Create a new residual block.
    pub fn new(in_channels: usize, out_channels: usize, stride: usize, device: &B::Device) -> Self {
        let conv1 = Conv2dConfig::new([in_channels, out_channels], [3, 3])
            .with_stride([stride, stride])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn1 = FrozenBatchNorm::new(out_channels, device);

        let conv2 = Conv2dConfig::new([out_channels, out_channels], [3, 3])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .with_bias(false)
            .init(device);
        let bn2 = FrozenBatchNorm::new(out_channels, device);

        // Projection when the block changes resolution or width
        let (downsample, downsample_bn) = if stride != 1 || in_channels != out_channels {
            let ds = Conv2dConfig::new([in_channels, out_channels], [1, 1])
                .with_stride([stride, stride])
                .with_bias(false)
                .init(device);
            (Some(ds), Some(FrozenBatchNorm::new(out_channels, device)))
        } else {
            (None, None)
        };

        Self {
            conv1,
            bn1,
            conv2,
            bn2,
            downsample,
            downsample_bn,
        }
    }

    /// Forward pass.
    pub fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let relu = Relu::new();

        let out = self.conv1.forward(x.clone());
        let out = self.bn1.forward(out);
        let out = relu.forward(out);

        let out = self.conv2.forward(out);
        let out = self.bn2.forward(out);

        let identity = match (&self.downsample, &self.downsample_bn) {
            (Some(ds), Some(ds_bn)) => ds_bn.forward(ds.forward(x)),
            _ => x,
        };

        relu.forward(out + identity)
    }
}

/// ResNet classifier: stem, four residual stages, global pooling, linear head.
#[derive(Module, Debug)]
pub struct ResNet<B: Backend> {
    conv1: Conv2d<B>,
    bn1: FrozenBatchNorm<B>,
    maxpool: MaxPool2d,
    layer1: Vec<BasicBlock<B>>,
    layer2: Vec<BasicBlock<B>>,
    layer3: Vec<BasicBlock<B>>,
    layer4: Vec<BasicBlock<B>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear<B>,
}

impl<B: Backend> ResNet<B> {
    /// Create a new ResNet model.
    pub fn new(config: ResNetConfig, device: &B::Device) -> Self {
        let widths = config.stage_channels;

        let conv1 = Conv2dConfig::new([config.in_channels, widths[0]], [7, 7])
            .with_stride([2, 2])
            .with_padding(PaddingConfig2d::Explicit(3, 3))
            .with_bias(false)
            .init(device);
        let bn1 = FrozenBatchNorm::new(widths[0], device);
        let maxpool = MaxPool2dConfig::new([3, 3])
            .with_strides([2, 2])
            .with_padding(PaddingConfig2d::Explicit(1, 1))
            .init();

        let mut stages: Vec<Vec<BasicBlock<B>>> = Vec::with_capacity(4);
        let mut in_channels = widths[0];
        for (stage, (&out_channels, &n_blocks)) in widths
            .iter()
            .zip(config.blocks_per_stage.iter())
            .enumerate()
        {
            let first_stride = if stage == 0 { 1 } else { 2 };
            let mut blocks = Vec::with_capacity(n_blocks);
            for i in 0..n_blocks {
                let stride = if i == 0 { first_stride } else { 1 };
                blocks.push(BasicBlock::new(in_channels, out_channels, stride, device));
                in_channels = out_channels;
            }
            stages.push(blocks);
        }
        let mut stages = stages.into_iter();

        Self {
            conv1,
            bn1,
            maxpool,
            layer1: stages.next().unwrap_or_default(),
            layer2: stages.next().unwrap_or_default(),
            layer3: stages.next().unwrap_or_default(),
            layer4: stages.next().unwrap_or_default(),
            avgpool: AdaptiveAvgPool2dConfig::new([1, 1]).init(),
            fc: LinearConfig::new(config.feature_channels(), config.n_classes).init(device),
        }
    }

    /// Replace the classification head.
    #[must_use]
    pub fn with_fc(mut self, fc: Linear<B>) -> Self {
        self.fc = fc;
        self
    }

    /// Replace the head with explicit weights of shape (features, classes)
    /// and a bias of shape (classes).
    #[must_use]
    pub fn with_head(self, weight: Tensor<B, 2>, bias: Tensor<B, 1>) -> Self {
        self.with_fc(Linear {
            weight: Param::from_tensor(weight),
            bias: Some(Param::from_tensor(bias)),
        })
    }

    /// Borrow the classification head.
    pub fn fc(&self) -> &Linear<B> {
        &self.fc
    }

    fn stage(&self, index: usize) -> &[BasicBlock<B>] {
        match index {
            0 => &self.layer1,
            1 => &self.layer2,
            2 => &self.layer3,
            _ => &self.layer4,
        }
    }

    fn stem(&self, x: Tensor<B, 4>) -> Tensor<B, 4> {
        let out = self.conv1.forward(x);
        let out = self.bn1.forward(out);
        let out = Relu::new().forward(out);
        self.maxpool.forward(out)
    }

    fn run_stages(&self, mut x: Tensor<B, 4>, stages: std::ops::Range<usize>) -> Tensor<B, 4> {
        for index in stages {
            for block in self.stage(index) {
                x = block.forward(x);
            }
        }
        x
    }

    fn classify(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.avgpool.forward(x);
        let [batch, channels, _, _] = out.dims();
        self.fc.forward(out.reshape([batch, channels]))
    }
}

impl<B: Backend> CamClassifier<B> for ResNet<B> {
    fn n_classes(&self) -> usize {
        // Linear weights are stored as (d_input, d_output)
        self.fc.weight.val().dims()[1]
    }

    fn forward_features(&self, x: Tensor<B, 4>, layer: TargetLayer) -> Option<Tensor<B, 4>> {
        let out = self.stem(x);
        Some(self.run_stages(out, 0..layer.stage() + 1))
    }

    fn forward_head(&self, features: Tensor<B, 4>, layer: TargetLayer) -> Tensor<B, 2> {
        let out = self.run_stages(features, layer.stage() + 1..4);
        self.classify(out)
    }

    fn forward(&self, x: Tensor<B, 4>) -> Tensor<B, 2> {
        let out = self.stem(x);
        let out = self.run_stages(out, 0..4);
        self.classify(out)
    }
}
