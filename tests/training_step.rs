//! End-to-end training on tiny synthetic image batches

use std::collections::HashMap;

use tch::{nn::VarStore, Device, Kind, Tensor};
use tempfile::tempdir;
use vae_wgan_dyt::{
    data::DataLoader,
    model::{TanhMode, VaeConfig, VaeGan, VaeGanConfig},
    training::{Trainer, TrainingConfig},
    utils::{find_latest_checkpoint, load_checkpoint, load_checkpoint_meta},
};

const IMAGE_SIZE: i64 = 32;

fn small_model(tanh_mode: Option<TanhMode>) -> VaeGan {
    let mut config = VaeGanConfig {
        vae: VaeConfig {
            image_size: IMAGE_SIZE,
            restore_resolution: true,
            ..Default::default()
        },
        tanh_mode,
        ..Default::default()
    };
    config.discriminator.image_size = IMAGE_SIZE;
    VaeGan::new(config, Device::Cpu)
}

fn snapshot(vs: &VarStore) -> HashMap<String, Tensor> {
    vs.variables()
        .into_iter()
        .map(|(name, t)| (name, t.detach().copy()))
        .collect()
}

fn changed(vs: &VarStore, before: &HashMap<String, Tensor>) -> bool {
    vs.variables()
        .iter()
        .any(|(name, t)| !t.equal(&before[name]))
}

#[test]
fn single_step_updates_both_networks() {
    tch::manual_seed(0);
    let model = small_model(Some(TanhMode::Single));

    let black = Tensor::zeros([1, 3, IMAGE_SIZE, IMAGE_SIZE], (Kind::Float, Device::Cpu));
    let white = Tensor::ones([1, 3, IMAGE_SIZE, IMAGE_SIZE], (Kind::Float, Device::Cpu));
    let real = Tensor::cat(&[black, white], 0);

    let gen_before = snapshot(&model.gen_vs);
    let disc_before = snapshot(&model.disc_vs);

    let mut trainer = Trainer::new(TrainingConfig::default(), &model).unwrap();
    let losses = trainer.train_step(&model, &real).unwrap();

    assert!(losses.is_finite());
    assert!(losses.gradient_penalty >= 0.0);
    assert_eq!(trainer.global_step(), 1);
    assert!(changed(&model.gen_vs, &gen_before));
    assert!(changed(&model.disc_vs, &disc_before));
}

#[test]
fn several_critic_updates_per_step() {
    tch::manual_seed(1);
    let model = small_model(Some(TanhMode::Matrix));
    let config = TrainingConfig {
        disc_steps: 3,
        recon_weight: 1.0,
        kl_weight: 0.1,
        ..Default::default()
    };
    let mut trainer = Trainer::new(config, &model).unwrap();

    let real = Tensor::rand([2, 3, IMAGE_SIZE, IMAGE_SIZE], (Kind::Float, Device::Cpu));
    let losses = trainer.train_step(&model, &real).unwrap();

    assert!(losses.is_finite());
    assert_eq!(trainer.global_step(), 1);
}

#[test]
fn train_writes_checkpoints_that_reload() {
    tch::manual_seed(2);
    let dir = tempdir().unwrap();
    let checkpoint_dir = dir.path().to_str().unwrap().to_string();

    let mut model = small_model(Some(TanhMode::TimeFunction));
    let images = Tensor::rand([4, 3, IMAGE_SIZE, IMAGE_SIZE], (Kind::Float, Device::Cpu));
    let mut loader = DataLoader::from_tensor(images, 2, true, false).unwrap();

    let config = TrainingConfig {
        epochs: 2,
        checkpoint_every: 1,
        checkpoint_dir: checkpoint_dir.clone(),
        ..Default::default()
    };
    let mut trainer = Trainer::new(config, &model).unwrap();
    let metrics = trainer.train(&mut model, &mut loader).unwrap();

    assert_eq!(metrics.num_epochs(), 2);
    assert!(metrics.gen_losses.iter().all(|l| l.is_finite()));
    assert_eq!(trainer.global_step(), 4);

    let latest = find_latest_checkpoint(&checkpoint_dir).unwrap();
    assert!(latest.ends_with("checkpoint_epoch_0002"));
    let meta = load_checkpoint_meta(&latest).unwrap();
    assert_eq!(meta.tanh_mode.as_deref(), Some("time_function"));

    let mut restored = small_model(Some(TanhMode::TimeFunction));
    let (epoch, step, history) = load_checkpoint(&mut restored, &latest).unwrap();
    assert_eq!((epoch, step), (2, 4));
    assert_eq!(history.num_epochs(), 2);

    let z = Tensor::randn([3, model.latent_dim()], (Kind::Float, Device::Cpu));
    let original = tch::no_grad(|| model.vae.decode(&z));
    let reloaded = tch::no_grad(|| restored.vae.decode(&z));
    assert!(original.allclose(&reloaded, 1e-6, 1e-6, false));

    assert!(dir.path().join("generator_final.pt").exists());
    assert!(dir.path().join("training_metrics.csv").exists());
}
