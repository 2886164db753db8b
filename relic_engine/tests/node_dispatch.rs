mod common;

use std::path::Path;

use anyhow::{Context, Result};
use serde_json::Value;
use tempfile::tempdir;

use common::{
    op, path_str, read_json, run_engine, when, write_game, AgeFixture, GameDir, GameFixture,
    NodeFixture,
};

fn two_age_game() -> GameFixture {
    GameFixture {
        ages: vec![
            AgeFixture {
                name: "harbor".to_string(),
                nodes: vec![
                    NodeFixture {
                        nodes: vec![1],
                        main: vec![
                            when(1, vec![op(0x03, &[1])]),
                            when(2, vec![op(0x03, &[2])]),
                            when(3, vec![op(0x03, &[3]), op(0x67, &[1, 1, 2])]),
                        ],
                    },
                    NodeFixture {
                        nodes: vec![2],
                        main: vec![when(1, vec![op(0x03, &[20])])],
                    },
                ],
                ..AgeFixture::default()
            },
            AgeFixture {
                name: "tower".to_string(),
                nodes: vec![NodeFixture {
                    nodes: vec![3, 4],
                    main: vec![when(9, vec![op(0x03, &[7]), op(0xF0, &[])])],
                }],
                ..AgeFixture::default()
            },
        ],
        ..GameFixture::default()
    }
}

fn boot(game: &GameDir, log: &Path, extra: &[&str]) -> Result<std::process::Output> {
    let mut args = vec![
        "boot",
        "--executable",
        path_str(&game.executable),
        "--profile-json",
        path_str(&game.profile),
        "--event-log-json",
        path_str(log),
    ];
    args.extend_from_slice(extra);
    run_engine(&args)
}

fn drawn_images(log: &Value) -> Vec<i64> {
    log["events"]
        .as_array()
        .map(|events| {
            events
                .iter()
                .filter(|event| event["kind"] == "draw_image")
                .filter_map(|event| event["id"].as_i64())
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn true_conditions_run_in_list_order() -> Result<()> {
    let temp_dir = tempdir().context("creating temporary game directory")?;
    let game = write_game(temp_dir.path(), &two_age_game())?;
    let log_path = game.root.join("log.json");

    let output = boot(&game, &log_path, &["--false-condition", "2"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let log = read_json(&log_path)?;
    assert_eq!(drawn_images(&log), vec![1, 3, 20]);
    assert_eq!(log["final_location"]["node"], 2);
    Ok(())
}

#[test]
fn node_lists_share_scripts() -> Result<()> {
    let temp_dir = tempdir()?;
    let game = write_game(temp_dir.path(), &two_age_game())?;
    let log_path = game.root.join("log.json");

    for node in ["3", "4"] {
        let output = boot(&game, &log_path, &["--age", "2", "--node", node])?;
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
        let log = read_json(&log_path)?;
        assert_eq!(drawn_images(&log), vec![7]);
        assert_eq!(log["final_location"]["age"], 2);
        assert_eq!(log["final_location"]["node"], node.parse::<u16>()?);
    }
    Ok(())
}

#[test]
fn only_room_one_exists() -> Result<()> {
    let temp_dir = tempdir()?;
    let game = write_game(temp_dir.path(), &two_age_game())?;
    let log_path = game.root.join("log.json");

    let output = boot(&game, &log_path, &["--room", "2"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("room 2"), "unexpected stderr: {stderr}");
    assert!(!log_path.exists());
    Ok(())
}

#[test]
fn unknown_node_is_reported() -> Result<()> {
    let temp_dir = tempdir()?;
    let game = write_game(temp_dir.path(), &two_age_game())?;
    let log_path = game.root.join("log.json");

    let output = boot(&game, &log_path, &["--age", "2", "--node", "5"])?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("node 5"), "unexpected stderr: {stderr}");
    Ok(())
}

#[test]
fn quit_flag_stops_before_the_next_node() -> Result<()> {
    let temp_dir = tempdir()?;
    let game = write_game(temp_dir.path(), &two_age_game())?;
    let log_path = game.root.join("log.json");

    let output = boot(&game, &log_path, &["--quit-after-polls", "0"])?;
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let log = read_json(&log_path)?;
    assert_eq!(drawn_images(&log), vec![1, 2, 3]);
    assert_eq!(log["final_location"]["node"], 1);
    assert_eq!(log["locations"].as_array().map(Vec::len), Some(1));
    Ok(())
}
