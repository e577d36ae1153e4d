//! End-to-end training on the two toy tasks.
//!
//! Tolerances are deliberately loose: counting must land within one of the
//! true count on average, and a 40-step autoregressive sine forecast must
//! keep its error well under the signal variance (0.5).

use gated_rnn::tasks::{
    autoregressive_forecast, binary_counting_samples, predicted_count, sine_wave_series, sine_wave_windows,
    BINARY_COUNTING_SEQ_LEN, SINE_WINDOW,
};
use gated_rnn::training::create_adam_trainer;
use gated_rnn::{GRUCell, LSTMCell, ModelConfig, SequenceModel, TrainingConfig};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[test]
fn test_lstm_learns_binary_counting() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut rng = StdRng::seed_from_u64(2024);

    let train = binary_counting_samples(384, BINARY_COUNTING_SEQ_LEN, &mut rng);
    let held_out = binary_counting_samples(100, BINARY_COUNTING_SEQ_LEN, &mut rng);

    let model_config = ModelConfig { input_size: 1, hidden_size: 8, output_size: 1, ..ModelConfig::default() };
    let model = SequenceModel::<LSTMCell>::from_config(&model_config, &mut rng).unwrap();
    let config = TrainingConfig { epochs: 80, batch_size: 32, learning_rate: 0.01, log_every: 20, ..TrainingConfig::default() };

    let mut trainer = create_adam_trainer(model, config);
    trainer.train(&train, None).unwrap();

    let mut total_error = 0.0;
    let mut within_one = 0;
    for sample in &held_out {
        let prediction = trainer.model.predict(&sample.inputs).unwrap()[[0, 0]];
        let predicted = predicted_count(prediction, BINARY_COUNTING_SEQ_LEN);
        let actual = predicted_count(sample.targets[0][[0, 0]], BINARY_COUNTING_SEQ_LEN);

        let error = (predicted - actual).abs();
        total_error += error;
        if error <= 1.0 {
            within_one += 1;
        }
    }

    let mean_error = total_error / held_out.len() as f64;
    assert!(mean_error < 1.0, "mean absolute count error {}", mean_error);
    assert!(within_one >= 75, "only {} of 100 counts within ±1", within_one);
}

#[test]
fn test_gru_extends_sine_wave_autoregressively() {
    let _ = env_logger::builder().is_test(true).try_init();
    let step = 0.1;
    let train_len = 400;
    let horizon = 40;

    let full = sine_wave_series(train_len + horizon, step);
    let (history, future) = full.split_at(train_len);
    let windows = sine_wave_windows(history, SINE_WINDOW);

    let model_config = ModelConfig { input_size: 1, hidden_size: 12, output_size: 1, ..ModelConfig::default() };
    let model = SequenceModel::<GRUCell>::from_config(&model_config, &mut StdRng::seed_from_u64(7)).unwrap();
    let config = TrainingConfig { epochs: 60, batch_size: 32, learning_rate: 0.01, log_every: 20, ..TrainingConfig::default() };

    let mut trainer = create_adam_trainer(model, config);
    trainer.train(&windows, None).unwrap();

    let forecast = autoregressive_forecast(&trainer.model, &history[train_len - SINE_WINDOW..], horizon).unwrap();
    assert_eq!(forecast.len(), horizon);

    let mse: f64 = forecast.iter().zip(future).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / horizon as f64;
    assert!(mse < 0.25, "autoregressive MSE {} against signal variance 0.5", mse);
}
