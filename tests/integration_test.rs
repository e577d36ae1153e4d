use gated_rnn::models::recurrent_network::RecurrentLayer;
use gated_rnn::tasks::stack_batch;
use gated_rnn::training::create_adam_trainer;
use gated_rnn::{
    run_sequence, CombineMode, Direction, GRUCell, GRUNetwork, LSTMCell, LSTMNetwork, ModelConfig, OutputMode,
    RecurrentCell, RecurrentNetwork, RnnError, SequenceModel, TextClassifier, TrainingConfig, TrainingSample,
};
use ndarray::{arr2, s, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

fn sequence() -> Vec<Array2<f64>> {
    vec![arr2(&[[0.5], [0.1], [-0.3]]), arr2(&[[0.2], [-0.4], [0.9]]), arr2(&[[-0.7], [0.0], [0.3]])]
}

#[test]
fn test_lstm_network_integration() {
    let input_size = 3;
    let hidden_size = 2;
    let num_layers = 2;
    let network = LSTMNetwork::new(input_size, hidden_size, num_layers);

    let output = network.forward_sequence(&sequence()).unwrap();

    assert_eq!(output.outputs.len(), 3);
    assert_eq!(output.final_hidden.shape(), &[hidden_size, 1]);
}

#[test]
fn test_bidirectional_network_uses_independent_directions() {
    let mut rng = StdRng::seed_from_u64(5);
    let forward = GRUCell::with_rng(3, 4, &mut rng);
    let backward = GRUCell::with_rng(3, 4, &mut rng);
    let layers = vec![RecurrentLayer { forward: forward.clone(), backward: Some(backward.clone()) }];
    let network = GRUNetwork::from_layers(layers, CombineMode::Concat).unwrap();

    let output = network.forward_sequence(&sequence()).unwrap();
    let left_to_right = run_sequence(&forward, &sequence(), Direction::Forward).unwrap();
    let right_to_left = run_sequence(&backward, &sequence(), Direction::Backward).unwrap();

    assert_eq!(output.final_hidden.slice(s![..4, ..]), left_to_right.final_hidden().view());
    assert_eq!(output.final_hidden.slice(s![4.., ..]), right_to_left.final_hidden().view());
    for t in 0..3 {
        assert_eq!(output.outputs[t].slice(s![..4, ..]), left_to_right.outputs[t].view());
        assert_eq!(output.outputs[t].slice(s![4.., ..]), right_to_left.outputs[t].view());
    }
}

#[test]
fn test_sum_and_average_modes_keep_hidden_width() {
    for mode in [CombineMode::Sum, CombineMode::Average] {
        let network = LSTMNetwork::with_rng(3, 5, 2, true, mode, &mut StdRng::seed_from_u64(6));
        assert_eq!(network.output_size(), 5);

        let output = network.forward_sequence(&sequence()).unwrap();
        assert_eq!(output.final_hidden.shape(), &[5, 1]);
    }
}

#[test]
fn test_network_stops_at_first_bad_step() {
    let network = LSTMNetwork::new(3, 4, 1);
    let mut seq = sequence();
    seq.push(Array2::ones((2, 1)));

    assert!(matches!(network.forward_sequence(&seq), Err(RnnError::ShapeMismatch { .. })));
    assert!(matches!(network.forward_sequence(&[]), Err(RnnError::EmptySequence)));
}

#[test]
fn test_batched_sequences_are_independent() {
    let config = ModelConfig { input_size: 3, hidden_size: 4, bidirectional: true, ..ModelConfig::default() };
    let model = SequenceModel::<LSTMCell>::from_config(&config, &mut StdRng::seed_from_u64(8)).unwrap();

    let first = TrainingSample::new(sequence(), vec![arr2(&[[0.0]])]);
    let mut reversed = sequence();
    reversed.reverse();
    let second = TrainingSample::new(reversed, vec![arr2(&[[0.0]])]);
    let batch = stack_batch(&[&first, &second]).unwrap();

    let batched = model.predict(&batch.inputs).unwrap();
    let alone_first = model.predict(&first.inputs).unwrap();
    let alone_second = model.predict(&second.inputs).unwrap();

    assert!((batched[[0, 0]] - alone_first[[0, 0]]).abs() < 1e-12);
    assert!((batched[[0, 1]] - alone_second[[0, 0]]).abs() < 1e-12);
}

#[test]
fn test_generic_network_over_either_cell() {
    fn final_width<C: RecurrentCell>(network: &RecurrentNetwork<C>) -> usize {
        network.forward_sequence(&sequence()).unwrap().final_hidden.nrows()
    }

    let mut rng = StdRng::seed_from_u64(9);
    let lstm = LSTMNetwork::with_rng(3, 6, 1, true, CombineMode::Concat, &mut rng);
    let gru = GRUNetwork::with_rng(3, 6, 1, false, CombineMode::Concat, &mut rng);

    assert_eq!(final_width(&lstm), 12);
    assert_eq!(final_width(&gru), 6);
}

#[test]
fn test_trainer_learns_difference_of_two_steps() {
    let data: Vec<TrainingSample> = (0..16)
        .map(|i| {
            let a = (i % 4) as f64 / 4.0;
            let b = (i / 4) as f64 / 4.0;
            let inputs = vec![arr2(&[[a]]), arr2(&[[b]])];
            TrainingSample::new(inputs, vec![arr2(&[[b - a]])])
        })
        .collect();

    let model_config = ModelConfig { hidden_size: 8, output_mode: OutputMode::LastStep, ..ModelConfig::default() };
    let model = SequenceModel::<GRUCell>::from_config(&model_config, &mut StdRng::seed_from_u64(10)).unwrap();
    let config = TrainingConfig { epochs: 200, batch_size: 4, learning_rate: 0.01, ..TrainingConfig::default() };
    let mut trainer = create_adam_trainer(model, config);

    let before = trainer.evaluate(&data).unwrap();
    trainer.train(&data, None).unwrap();
    let after = trainer.evaluate(&data).unwrap();

    assert!(after < before * 0.3, "loss {} -> {}", before, after);
}

#[test]
fn test_text_classifier_end_to_end() {
    let mut classifier = TextClassifier::<GRUCell>::with_rng(12, 6, 8, 1, true, &mut StdRng::seed_from_u64(11));
    let mut optimizer = gated_rnn::Adam::new(0.02);

    // Token 1 marks positive reviews, token 2 negative ones, wherever it appears.
    let samples: Vec<(Vec<usize>, f64)> = vec![
        (vec![1, 5, 6, 7], 1.0),
        (vec![8, 1, 9], 1.0),
        (vec![5, 10, 1], 1.0),
        (vec![2, 5, 6, 7], 0.0),
        (vec![8, 2, 9], 0.0),
        (vec![5, 10, 2], 0.0),
    ];

    for _ in 0..80 {
        for (tokens, label) in &samples {
            classifier.train_step(tokens, *label, &mut optimizer, Some(5.0)).unwrap();
        }
    }

    assert_eq!(classifier.accuracy(&samples).unwrap(), 1.0);
}
