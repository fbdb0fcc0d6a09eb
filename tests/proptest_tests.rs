//! Property-based tests for configuration text handling and transaction
//! sequencing.
//!
//! Random configurations are generated as top-level lines with optional
//! indented children, which is the shape every supported platform prints.
//! Random operation sequences run against two drivers sharing one device.

mod common;

use common::*;
use netcfg::driver::Driver;
use netcfg::transaction::{
    CandidateSource, ConfigDiff, DeviceLocks, DiffFidelity, StagingMode, TransactionState,
};
use netcfg::vendor::NetworkPlatform;
use netcfg::vendor::common::{
    generate_config_diff, generate_config_diff_commands, generate_merge_diff, parse_config_input,
};
use netcfg::vendor::eos::{generate_session_name, validate_session_name};
use proptest::collection::vec;
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

fn config_word() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9./-]{0,12}").unwrap()
}

fn config_line() -> impl Strategy<Value = String> {
    vec(config_word(), 1..4)
        .prop_map(|words| words.join(" "))
        .prop_filter("not a negation", |line| !line.starts_with("no "))
}

fn config_block() -> impl Strategy<Value = Vec<String>> {
    (config_line(), vec(config_line(), 0..3)).prop_map(|(head, children)| {
        let mut lines = vec![head];
        lines.extend(children.into_iter().map(|c| format!(" {}", c)));
        lines
    })
}

fn configuration() -> impl Strategy<Value = String> {
    vec(config_block(), 0..8).prop_map(|blocks| {
        // Top-level lines are unique in a real configuration.
        blocks
            .into_iter()
            .enumerate()
            .map(|(i, mut block)| {
                block[0] = format!("{} {}", block[0], i);
                block.join("\n")
            })
            .collect::<Vec<_>>()
            .join("\n!\n")
    })
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn identical_configs_have_empty_diff(config in configuration()) {
        prop_assert!(generate_config_diff(&config, &config).trim().is_empty());
        prop_assert!(generate_config_diff_commands(&config, &config).is_empty());
    }

    #[test]
    fn merge_of_present_lines_is_empty(config in configuration()) {
        prop_assert!(generate_merge_diff(&config, &config).is_empty());
    }

    #[test]
    fn parsed_lines_never_blank_or_comments(config in configuration()) {
        for line in parse_config_input(&config) {
            prop_assert!(!line.trim().is_empty());
            prop_assert!(!line.trim_start().starts_with('!'));
        }
    }

    #[test]
    fn diff_counts_match_marked_lines(before in configuration(), after in configuration()) {
        let text = generate_config_diff(&before, &after);
        let diff = ConfigDiff::new(text.clone(), DiffFidelity::Estimated);
        let plus = text.lines().filter(|l| l.starts_with('+') && !l.starts_with("+++")).count();
        let minus = text.lines().filter(|l| l.starts_with('-') && !l.starts_with("---")).count();
        prop_assert_eq!(diff.additions(), plus);
        prop_assert_eq!(diff.deletions(), minus);
        prop_assert_eq!(diff.is_empty(), plus + minus == 0);
    }

    #[test]
    fn session_names_reject_cli_metacharacters(suffix in "[;|&$ `\n]{1,4}") {
        let name = format!("netcfg_{}", suffix);
        prop_assert!(validate_session_name(&name).is_err());
    }
}

#[test]
fn generated_session_names_validate() {
    for _ in 0..64 {
        assert!(validate_session_name(&generate_session_name()).is_ok());
    }
}

// ============================================================================
// Transaction Sequences
// ============================================================================

#[derive(Debug, Clone, Copy)]
enum Op {
    Load(usize, StagingMode),
    Compare(usize),
    Commit(usize),
    Discard(usize),
    Rollback(usize),
}

fn op() -> impl Strategy<Value = Op> {
    let driver = 0..2usize;
    let mode = prop_oneof![Just(StagingMode::Replace), Just(StagingMode::Merge)];
    prop_oneof![
        3 => (driver.clone(), mode).prop_map(|(d, m)| Op::Load(d, m)),
        2 => driver.clone().prop_map(Op::Compare),
        2 => driver.clone().prop_map(Op::Commit),
        2 => driver.clone().prop_map(Op::Discard),
        1 => driver.prop_map(Op::Rollback),
    ]
}

fn is_staged(driver: &Driver) -> bool {
    matches!(driver.state(), TransactionState::Staged(_))
}

async fn run_sequence(ops: Vec<Op>) -> Result<(), TestCaseError> {
    let locks = DeviceLocks::new();
    let sessions = [fake_ios("r1"), fake_ios("r1")];
    let mut drivers = vec![
        open_driver(NetworkPlatform::CiscoIos, &sessions[0], &locks).await,
        open_driver(NetworkPlatform::CiscoIos, &sessions[1], &locks).await,
    ];
    let mut staged = [false, false];

    for op in ops {
        match op {
            Op::Load(d, mode) => {
                let source = CandidateSource::text(SAMPLE_CANDIDATE);
                let result = match mode {
                    StagingMode::Replace => drivers[d].load_replace_candidate(source).await,
                    StagingMode::Merge => drivers[d].load_merge_candidate(source).await,
                };
                // Own candidate first, then adapter support, then the device lock
                if staged[d] {
                    prop_assert!(matches!(result, Err(ref e) if e.is_locked()));
                } else if mode == StagingMode::Merge {
                    prop_assert!(matches!(result, Err(ref e) if e.is_unsupported()));
                } else if staged[1 - d] {
                    prop_assert!(matches!(result, Err(ref e) if e.is_locked()));
                } else {
                    prop_assert!(result.is_ok());
                    staged[d] = true;
                }
            }
            Op::Compare(d) => {
                let diff = drivers[d].compare_config().await;
                prop_assert!(diff.is_ok());
                prop_assert_eq!(diff.map(|diff| diff.is_empty()).unwrap_or(false), !staged[d]);
            }
            Op::Commit(d) => {
                let result = drivers[d].commit_config().await;
                prop_assert_eq!(result.is_ok(), staged[d]);
                staged[d] = false;
            }
            Op::Discard(d) => {
                prop_assert!(drivers[d].discard_config().await.is_ok());
                staged[d] = false;
            }
            Op::Rollback(d) => {
                let result = drivers[d].rollback().await;
                if staged[0] || staged[1] {
                    prop_assert!(matches!(result, Err(ref e) if e.is_locked()));
                } else {
                    prop_assert!(result.is_ok());
                }
            }
        }

        prop_assert_eq!(is_staged(&drivers[0]), staged[0]);
        prop_assert_eq!(is_staged(&drivers[1]), staged[1]);
        prop_assert!(!(staged[0] && staged[1]));
        prop_assert_eq!(locks.is_locked("r1"), staged[0] || staged[1]);
        prop_assert!(locks.len() <= 1);
    }

    for driver in &mut drivers {
        prop_assert!(driver.close().await.is_ok());
    }
    prop_assert!(locks.is_empty());
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn at_most_one_candidate_staged_per_device(ops in vec(op(), 1..24)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(run_sequence(ops))?;
    }
}
