use std::collections::HashSet;
use std::io::Write;

use babble_core::model::context::{Context, Token};
use babble_core::model::generator::Generator;
use babble_core::model::markov_model::MarkovModel;

fn ctx(tokens: &[&str]) -> Context {
	Context::from_tokens(tokens.iter().map(|t| Token::from(*t)).collect())
}

#[test]
fn corpus_to_babble_pipeline() {
	let dir = tempfile::tempdir().unwrap();
	let corpus = dir.path().join("corpus.txt");
	let mut file = std::fs::File::create(&corpus).unwrap();
	writeln!(file, "the cat sat on the mat .").unwrap();
	writeln!(file, "the dog sat on the rug .").unwrap();
	writeln!(file, "a cat saw the dog , and ran .").unwrap();
	drop(file);

	let model = MarkovModel::from_corpus_file(&corpus, 2).unwrap();

	let vocab: HashSet<Token> = model
		.frequency(&Context::empty())
		.unwrap()
		.counts()
		.map(|(token, _)| token.clone())
		.collect();

	let mut generator = Generator::new(&model);
	generator.reset(99, 0.05, Context::empty(), Some(1), false).unwrap();

	// The sequence is endless; every produced token comes from the corpus.
	for token in generator.by_ref().take(500) {
		assert!(vocab.contains(&token), "unknown token {:?}", token);
	}

	// The context never outgrows the order, clause ends or not.
	assert!(generator.context().len() <= model.order());
}

#[test]
fn trained_model_survives_a_save_load_cycle() {
	let dir = tempfile::tempdir().unwrap();
	let path = dir.path().join("model.bin");

	let mut model = MarkovModel::new(2).unwrap();
	model.train(["the", "cat", "sat", ".", "the", "dog", "sat", "."]);
	model.save(&path).unwrap();

	let mut reloaded = MarkovModel::new(2).unwrap();
	reloaded.load(&path).unwrap();

	// The reloaded model drives generation exactly like the original.
	let mut generator = Generator::new(&reloaded);
	generator.reset(1, 0.0, ctx(&["sat"]), None, false).unwrap();
	assert_eq!(&*generator.next_token().unwrap(), ".");

	// Training continues to merge counts after a reload.
	reloaded.train(["the", "cow", "sat", "."]);
	assert_eq!(reloaded.frequency(&ctx(&["sat"])).unwrap().count("."), 3);
}
