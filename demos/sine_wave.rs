use gated_rnn::persistence::{ModelPersistence, PersistentModel};
use gated_rnn::tasks::{autoregressive_forecast, sine_wave_series, sine_wave_windows, SINE_WINDOW};
use gated_rnn::training::create_adam_trainer;
use gated_rnn::{LSTMCell, ModelConfig, SequenceModel, TrainingConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Sine Wave Forecasting ===\n");

    let step = 0.1;
    let train_len = 500;
    let horizon = 40;

    let full = sine_wave_series(train_len + horizon, step);
    let (history, future) = full.split_at(train_len);
    let windows = sine_wave_windows(history, SINE_WINDOW);
    let (train, validation) = windows.split_at(windows.len() * 9 / 10);
    println!("{} training windows, {} validation windows of length {}\n", train.len(), validation.len(), SINE_WINDOW);

    let model_config = ModelConfig { input_size: 1, hidden_size: 16, output_size: 1, ..ModelConfig::default() };
    let model = SequenceModel::<LSTMCell>::from_config(&model_config, &mut StdRng::seed_from_u64(3))?;
    let config = TrainingConfig { epochs: 60, batch_size: 32, learning_rate: 0.01, log_every: 10, ..TrainingConfig::default() };

    let mut trainer = create_adam_trainer(model, config);
    trainer.train(train, Some(validation))?;

    let forecast = autoregressive_forecast(&trainer.model, &history[train_len - SINE_WINDOW..], horizon)?;

    println!("step  predicted   actual");
    for (i, (p, t)) in forecast.iter().zip(future).enumerate().step_by(5) {
        println!("{:>4}  {:>9.4}  {:>7.4}", i, p, t);
    }

    let mse = forecast.iter().zip(future).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / horizon as f64;
    println!("\nAutoregressive MSE over {} steps: {:.6} (signal variance 0.5)", horizon, mse);

    let path = std::env::temp_dir().join("sine_wave_lstm.json");
    let final_loss = trainer.get_latest_metrics().map(|m| m.train_loss);
    let metadata = ModelPersistence::create_metadata(
        &trainer.model,
        "sine_wave_lstm".to_string(),
        trainer.get_metrics_history().len(),
        final_loss,
        Some("Next-value predictor over 40-sample windows".to_string()),
    );
    trainer.model.save(&path, metadata)?;
    println!("Saved model to {}", path.display());

    Ok(())
}
