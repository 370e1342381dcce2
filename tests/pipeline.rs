use permute_core::config::{RunConfig, RunMode};
use permute_core::corpus::parse_corpus;
use permute_core::persistence::{
    load_manifest, MANIFEST_FILE, ORIGINAL_COUNTS_FILE, ORIGINAL_DIR, PERMUTE_DIR, WORD_LENGTH_FILE,
};
use permute_core::PermuteEngine;
use std::fs;
use std::path::{Path, PathBuf};

const CORPUS: &str = "\
ONE{Family.Genus|info
meta line
1 I ab //
2 you ba //
3 we aGa //
TWO{Family.Genus|info
meta line
1 I bab //
2 you XXX //
3 we Gb //
SILENT{Family.Genus|info
meta line
1 I XXX //
2 you XXX //
THREE{Family.Genus|info
meta line
1 I aa //
2 you bG //
3 we a //
";

fn setup(dir: &Path) -> PathBuf {
    let corpus = dir.join("corpus.txt");
    fs::write(&corpus, CORPUS).unwrap();
    corpus
}

fn config(dir: &Path, corpus: &Path, mode: RunMode, num_trials: usize) -> RunConfig {
    RunConfig {
        corpus_path: corpus.to_path_buf(),
        output_dir: dir.to_path_buf(),
        mode,
        num_trials,
        workers: 2,
        partitions: 2,
        flush_every: 2,
        seed: Some(2017),
        meanings: vec!["I".into(), "you".into(), "we".into()],
        symbols: vec!['a', 'b', 'G'],
        ..RunConfig::default()
    }
}

fn run(config: RunConfig) -> permute_core::Result<permute_core::core::trials::RunSummary> {
    PermuteEngine::new(config)?.run()
}

fn pair_file(dir: &Path, key: &str) -> PathBuf {
    dir.join(PERMUTE_DIR).join(format!("{}.csv", key))
}

fn all_keys() -> Vec<&'static str> {
    vec!["aa", "ab", "aG_", "ba", "bb", "bG_", "G_a", "G_b", "G_G_"]
}

#[test]
fn fresh_run_writes_every_table() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = setup(dir.path());

    let summary = run(config(dir.path(), &corpus, RunMode::Fresh, 5)).unwrap();
    assert_eq!(summary.trials_committed, 5);

    let original = fs::read_to_string(dir.path().join(ORIGINAL_DIR).join(ORIGINAL_COUNTS_FILE)).unwrap();
    let lines: Vec<&str> = original.lines().collect();
    assert_eq!(lines[0], "sound,I,you,we");
    assert_eq!(lines.len(), 10);
    assert!(lines.contains(&"ab,2,0,0"));
    assert!(lines.contains(&"ba,1,1,0"));
    assert!(lines.contains(&"aG,0,0,1"));
    assert!(lines.contains(&"Gb,0,0,1"));
    assert!(lines.contains(&"bG,0,1,0"));
    assert!(lines.contains(&"aa,1,0,0"));

    let lengths = fs::read_to_string(dir.path().join(ORIGINAL_DIR).join(WORD_LENGTH_FILE)).unwrap();
    assert_eq!(
        lengths.lines().collect::<Vec<_>>(),
        ["language,I,you,we", "ONE,2,2,3", "TWO,3,0,2", "THREE,2,2,1"]
    );

    for key in all_keys() {
        let text = fs::read_to_string(pair_file(dir.path(), key)).unwrap();
        assert_eq!(text.lines().count(), 6, "{}", key);
        assert_eq!(text.lines().next(), Some("sound,I,you,we"));
    }
    let manifest = load_manifest(&dir.path().join(PERMUTE_DIR).join(MANIFEST_FILE)).unwrap();
    assert_eq!(manifest.trials_committed, 5);
    assert_eq!(manifest.seed, 2017);
}

#[test]
fn continuation_extends_without_touching_earlier_rows() {
    let split = tempfile::tempdir().unwrap();
    let whole = tempfile::tempdir().unwrap();
    let corpus = setup(split.path());

    run(config(split.path(), &corpus, RunMode::Fresh, 5)).unwrap();
    let before: Vec<String> = all_keys()
        .into_iter()
        .map(|key| fs::read_to_string(pair_file(split.path(), key)).unwrap())
        .collect();

    let summary = run(config(split.path(), &corpus, RunMode::Append, 3)).unwrap();
    assert_eq!(summary.first_trial, 5);
    assert_eq!(summary.trials_committed, 8);

    run(config(whole.path(), &corpus, RunMode::Fresh, 8)).unwrap();
    for (key, prefix) in all_keys().into_iter().zip(before) {
        let after = fs::read_to_string(pair_file(split.path(), key)).unwrap();
        assert!(after.starts_with(&prefix), "{} rewrote earlier rows", key);
        assert_eq!(after.lines().count(), 9);
        // same seed and trial indices as one uninterrupted run
        assert_eq!(after, fs::read_to_string(pair_file(whole.path(), key)).unwrap());
    }
}

#[test]
fn rows_from_an_interrupted_flush_are_trimmed() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = setup(dir.path());
    run(config(dir.path(), &corpus, RunMode::Fresh, 4)).unwrap();

    let path = pair_file(dir.path(), "ab");
    let committed = fs::read_to_string(&path).unwrap();
    fs::write(&path, format!("{}ab,9,9,9\n", committed)).unwrap();

    run(config(dir.path(), &corpus, RunMode::Append, 0)).unwrap();
    assert_eq!(fs::read_to_string(&path).unwrap(), committed);
}

#[test]
fn missing_rows_fail_the_continuation() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = setup(dir.path());
    run(config(dir.path(), &corpus, RunMode::Fresh, 4)).unwrap();

    let path = pair_file(dir.path(), "G_a");
    let text = fs::read_to_string(&path).unwrap();
    let truncated: String = text.split_inclusive('\n').take(3).collect();
    fs::write(&path, truncated).unwrap();

    let err = run(config(dir.path(), &corpus, RunMode::Append, 2)).unwrap_err();
    assert_eq!(err.kind(), "corrupt_batch");
}

#[test]
fn continuation_with_another_vocabulary_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = setup(dir.path());
    run(config(dir.path(), &corpus, RunMode::Fresh, 2)).unwrap();

    let mut other = config(dir.path(), &corpus, RunMode::Append, 2);
    other.meanings = vec!["I".into(), "we".into(), "you".into()];
    assert_eq!(run(other).unwrap_err().kind(), "incompatible_batch");
}

#[test]
fn failed_fresh_run_cannot_be_continued() {
    let dir = tempfile::tempdir().unwrap();
    let corpus_a = setup(dir.path());
    run(config(dir.path(), &corpus_a, RunMode::Fresh, 2)).unwrap();

    let corpus_b = dir.path().join("other.txt");
    fs::write(&corpus_b, "ONLY{Family.Genus|info\nmeta line\n1 I ba //\n").unwrap();
    let counts = dir.path().join(ORIGINAL_DIR).join(ORIGINAL_COUNTS_FILE);
    fs::remove_file(&counts).unwrap();
    fs::create_dir(&counts).unwrap();

    let err = run(config(dir.path(), &corpus_b, RunMode::Fresh, 2)).unwrap_err();
    assert_eq!(err.kind(), "io");
    assert!(!dir.path().join(PERMUTE_DIR).join(MANIFEST_FILE).exists());

    // no manifest means nothing to continue, instead of appending to corpus A's batch
    let err = run(config(dir.path(), &corpus_a, RunMode::Append, 2)).unwrap_err();
    assert_eq!(err.kind(), "io");
    assert_eq!(fs::read_to_string(pair_file(dir.path(), "ab")).unwrap().lines().count(), 3);
}

#[test]
fn missing_corpus_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.txt");
    let err = run(config(dir.path(), &missing, RunMode::Fresh, 1)).unwrap_err();
    assert_eq!(err.kind(), "io");
}

#[test]
fn original_counts_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = setup(dir.path());
    let engine = PermuteEngine::new(config(dir.path(), &corpus, RunMode::Fresh, 0)).unwrap();
    let (table, _) = parse_corpus(CORPUS.as_bytes(), engine.vocabulary(), "XXX").unwrap();

    let first = engine.count_original(&table).unwrap();
    let second = engine.count_original(&table).unwrap();
    assert_eq!(first, second);
    assert!(first.max_count() as usize <= table.num_languages());
}
