use gated_rnn::optimizers::Adam;
use gated_rnn::{GRUCell, TextClassifier};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const VOCAB_SIZE: usize = 40;
const POSITIVE: [usize; 4] = [1, 2, 3, 4];
const NEGATIVE: [usize; 4] = [5, 6, 7, 8];

/// Synthetic "reviews": filler tokens with a few sentiment-bearing words mixed in.
///
/// Token ids stand in for an already-built vocabulary.
fn review<R: Rng>(positive: bool, rng: &mut R) -> (Vec<usize>, f64) {
    let len = rng.gen_range(6..14);
    let mut tokens: Vec<usize> = (0..len).map(|_| rng.gen_range(9..VOCAB_SIZE)).collect();

    let (majority, minority) = if positive { (&POSITIVE, &NEGATIVE) } else { (&NEGATIVE, &POSITIVE) };
    for _ in 0..2 {
        let position = rng.gen_range(0..tokens.len());
        tokens[position] = *majority.choose(rng).unwrap_or(&majority[0]);
    }
    if rng.gen_bool(0.3) {
        let position = rng.gen_range(0..tokens.len());
        tokens[position] = *minority.choose(rng).unwrap_or(&minority[0]);
    }

    (tokens, if positive { 1.0 } else { 0.0 })
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Bidirectional GRU Sentiment Classifier ===\n");

    let mut rng = StdRng::seed_from_u64(7);
    let mut train: Vec<(Vec<usize>, f64)> = (0..200).map(|i| review(i % 2 == 0, &mut rng)).collect();
    let test: Vec<(Vec<usize>, f64)> = (0..60).map(|i| review(i % 2 == 0, &mut rng)).collect();

    let mut classifier = TextClassifier::<GRUCell>::with_rng(VOCAB_SIZE, 8, 12, 1, true, &mut rng);
    let mut optimizer = Adam::new(0.01);
    println!("Model parameters: {}\n", classifier.model.num_parameters() + classifier.embedding.weight.len());

    for epoch in 0..15 {
        train.shuffle(&mut rng);
        let mut total_loss = 0.0;
        for (tokens, label) in &train {
            total_loss += classifier.train_step(tokens, *label, &mut optimizer, Some(5.0))?;
        }
        println!(
            "Epoch {:>2}: loss {:.4}, train acc {:.3}, test acc {:.3}",
            epoch,
            total_loss / train.len() as f64,
            classifier.accuracy(&train)?,
            classifier.accuracy(&test)?
        );
    }

    println!();
    for (tokens, label) in test.iter().take(5) {
        println!("{:?} -> p(positive) = {:.3} (label {})", tokens, classifier.predict_proba(tokens)?, label);
    }

    Ok(())
}
