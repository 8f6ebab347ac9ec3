use std::fs;
use std::process::Command;

use toponym_regions::reader::{read_token_array, read_toponym_coordinates, read_toponym_regions};
use toponym_regions::{
    CandidacyFilter, Constraint, ExperimentParameters, ModelType, RegionModel, SphericalRegionModel,
    TokenCorpus,
};

// Two documents, each holding the shared toponym (word 0) and a common word (word 1).
fn toy_corpus() -> TokenCorpus {
    TokenCorpus::new(vec![0, 1, 0, 1], vec![0, 0, 1, 1], vec![1, 0, 1, 0], vec![0, 0, 0, 0]).unwrap()
}

fn heating_parameters(seed: u64) -> ExperimentParameters {
    ExperimentParameters {
        initial_temperature: 0.1,
        target_temperature: 1.0,
        temperature_decrement: 0.3,
        burn_in_iterations: 20,
        samples: 0,
        random_seed: seed,
        ..Default::default()
    }
}

#[test]
fn toponym_decodes_to_a_permitted_region() {
    for seed in 1..=10 {
        let filter = CandidacyFilter::from_rows(2, 3, vec![(0, vec![0, 1])]).unwrap();
        let mut model = RegionModel::new(toy_corpus(), filter, &heating_parameters(seed)).unwrap();
        model.train();
        model.decode();

        assert_eq!(model.sample_count(), 0);
        for i in [0, 2] {
            let region = model.assignments()[i].unwrap();
            assert!(region == 0 || region == 1, "seed {} toponym {} took region {}", seed, i, region);
        }
    }
}

#[test]
fn counts_match_assignments_after_training() {
    let params = ExperimentParameters {
        burn_in_iterations: 10,
        samples: 5,
        lag: 2,
        random_seed: 3,
        ..Default::default()
    };
    let filter = CandidacyFilter::from_rows(2, 3, vec![(0, vec![0, 1])]).unwrap();
    let mut model = RegionModel::new(toy_corpus(), filter, &params).unwrap();
    model.train();

    let counts = model.counts();
    assert_eq!(counts.total(), 4);
    for d in 0..2 {
        assert_eq!(counts.document_total(d), 2);
    }
    for (i, assignment) in model.assignments().iter().enumerate() {
        let region = assignment.unwrap();
        let word = model.corpus().word(i);
        assert!(counts.word_by_region[word * 3 + region] >= 1);
    }
    assert_eq!(model.sample_count(), 5);

    let posterior = model.posterior_counts();
    let total: f64 = posterior.region_counts.iter().sum();
    assert!((total - 4.0).abs() < 1e-9);
}

#[test]
fn fully_constrained_words_follow_their_toponyms() {
    let params = ExperimentParameters {
        constraint: Constraint::FullyConstrained,
        burn_in_iterations: 10,
        samples: 2,
        lag: 1,
        ..Default::default()
    };
    let filter = CandidacyFilter::from_rows(2, 3, vec![(0, vec![2])]).unwrap();
    let mut model = RegionModel::new(toy_corpus(), filter, &params).unwrap();
    model.train();
    model.decode();
    assert!(model.assignments().iter().all(|&a| a == Some(2)));
}

#[test]
fn spherical_model_resolves_coordinates() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = dir.path().join("tokens.txt");
    let coordinates = dir.path().join("coordinates.txt");
    fs::write(&tokens, "0 0 1 0\n1 0 0 0\n0 1 1 0\n2 1 1 0\n1 1 0 0\n").unwrap();
    fs::write(&coordinates, "0: 30.27,-97.74 -33.87,151.21\n2: 30.5,-97.5\n").unwrap();

    let token_file = read_token_array(&tokens).unwrap();
    let words = token_file.corpus.vocabulary_size();
    let lexicon = read_toponym_coordinates(&coordinates, words).unwrap();
    let params = ExperimentParameters {
        model: ModelType::Spherical,
        resample_coordinates: true,
        regions: 2,
        burn_in_iterations: 10,
        samples: 3,
        lag: 2,
        ..Default::default()
    };
    let filter = CandidacyFilter::permissive(words, params.regions);
    let mut model =
        SphericalRegionModel::new(token_file.corpus, filter, &lexicon, token_file.coordinate_indices, &params)
            .unwrap();
    model.train();
    model.decode();

    for i in model.corpus().toponym_tokens() {
        let word = model.corpus().word(i);
        let c = model.coordinate_indices()[i].unwrap();
        assert!(c < lexicon.candidates(word).len());
    }
    let directions = model.region_directions();
    assert_eq!(directions.len(), 2);
    assert!(directions.iter().any(Option::is_some));
}

#[test]
fn reader_inputs_drive_the_region_model() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = dir.path().join("tokens.txt");
    let filter_path = dir.path().join("filter.txt");
    fs::write(&tokens, "# toy corpus\n0 0 1 0\n1 0 0 0\n3 0 0 1\n0 1 1 0\n1 1 0 0\n").unwrap();
    fs::write(&filter_path, "0: 0 1\n1:\n").unwrap();

    let token_file = read_token_array(&tokens).unwrap();
    let filter = read_toponym_regions(&filter_path, token_file.corpus.vocabulary_size()).unwrap();
    assert_eq!(filter.regions(), 2);

    let mut model = RegionModel::new(token_file.corpus, filter, &heating_parameters(5)).unwrap();
    model.train();
    model.decode();
    assert_eq!(model.assignments()[2], None);
    assert_eq!(model.counts().total(), 4);
}

#[test]
fn cli_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = dir.path().join("tokens.txt");
    let coordinates = dir.path().join("coordinates.txt");
    let output = dir.path().join("report.json");
    fs::write(&tokens, "0 0 1 0\n1 0 0 0\n0 1 1 0\n1 1 0 0\n").unwrap();
    fs::write(&coordinates, "0: 30.27,-97.74 -33.87,151.21\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_toponym-regions"))
        .arg("train")
        .arg("--tokens")
        .arg(&tokens)
        .arg("--coordinates")
        .arg(&coordinates)
        .args(["--burn-in", "5", "--samples", "2", "--lag", "1", "--seed", "7"])
        .arg("--output")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["model"], "rlda");
    assert_eq!(report["regions"], 2);
    assert_eq!(report["sample_count"], 2);
    assert_eq!(report["grid"].as_array().unwrap().len(), 2);
}

#[test]
fn cli_spherical_model_opens_regions() {
    let dir = tempfile::tempdir().unwrap();
    let tokens = dir.path().join("tokens.txt");
    let coordinates = dir.path().join("coordinates.txt");
    let output = dir.path().join("report.json");
    fs::write(&tokens, "0 0 1 0 0\n1 0 0 0\n2 1 1 0 0\n1 1 0 0\n0 2 1 0 0\n").unwrap();
    fs::write(&coordinates, "0: 30.27,-97.74\n2: -33.87,151.21\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_toponym-regions"))
        .arg("train")
        .arg("--tokens")
        .arg(&tokens)
        .arg("--coordinates")
        .arg(&coordinates)
        .args(["--model", "spherical", "--region-birth"])
        .args(["--burn-in", "5", "--samples", "2", "--lag", "1", "--seed", "11"])
        .arg("--output")
        .arg(&output)
        .status()
        .unwrap();
    assert!(status.success());

    let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(report["model"], "spherical");
    assert_eq!(report["parameters"]["region_birth"], true);
    let regions = report["regions"].as_u64().unwrap() as usize;
    assert!(regions >= 1);
    let width = report["posterior"]["regions"].as_u64().unwrap() as usize;
    assert!(width > regions);
    assert_eq!(report["posterior"]["region_counts"].as_array().unwrap().len(), width);
}
