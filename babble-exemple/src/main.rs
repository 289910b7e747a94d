use std::io::Write;

use babble_core::model::context::{Context, Token};
use babble_core::model::generator::{Generator, ManualSelector};
use babble_core::model::markov_model::MarkovModel;

/// Terminal-backed manual selector.
///
/// Prints the candidate set and re-prompts until the user enters an
/// integer; 0 asks the generator for fresh candidates.
struct TerminalSelector;

impl ManualSelector for TerminalSelector {
    fn present_choices(&mut self, candidates: &[Token]) -> usize {
        println!("0: <Generate choices again>");
        for (i, candidate) in candidates.iter().enumerate() {
            println!("{}: {}", i + 1, candidate);
        }

        loop {
            print!("Enter your choice: ");
            let _ = std::io::stdout().flush();

            let mut line = String::new();
            if std::io::stdin().read_line(&mut line).is_err() {
                return 0;
            }
            match line.trim().parse::<usize>() {
                Ok(choice) if choice <= candidates.len() => return choice,
                Ok(_) => println!(
                    "Number out of range, please, use numbers in range [0-{}]",
                    candidates.len()
                ),
                Err(_) => println!("Not an integer number, try again"),
            }
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // First argument overrides the corpus path; "--manual" switches to
    // hand-picked generation.
    let corpus = std::env::args()
        .skip(1)
        .find(|arg| arg != "--manual")
        .unwrap_or_else(|| "./data/corpus.txt".to_owned());
    let manual = std::env::args().any(|arg| arg == "--manual");

    // Builds the model from the corpus, or loads the .bin cache when present.
    let model = MarkovModel::from_corpus_file(&corpus, 3)?;
    println!("{} contexts learned from {}", model.context_count(), corpus);

    let mut generator = Generator::new(&model);
    generator.set_selector(Box::new(TerminalSelector));

    // Restart from the unconditional distribution 5% of the time, and
    // keep only the last 2 tokens of context after a clause end.
    generator.reset(42, 0.05, Context::empty(), Some(2), manual)?;

    let mut line = String::new();
    for _ in 0..100 {
        let token = generator.next_token()?;
        line.push_str(&token);
        line.push(' ');

        // A saturated context means the babble is about to loop; reseed.
        if generator.is_current_context_saturated() {
            generator.reset(43, 0.05, Context::empty(), Some(2), manual)?;
        }
    }
    println!("{}", line.trim_end());

    Ok(())
}
