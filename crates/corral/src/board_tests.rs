// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn parse_headings_tasks_and_metadata() {
    let content = "\
# queued

fix nav
- claimed: amber

polish

# icebox

someday idea
";
    let items = parse_board(content);
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].title, "fix nav");
    assert_eq!(items[0].column, Column::Queued);
    assert_eq!(items[0].metadata.get("claimed").map(String::as_str), Some("amber"));
    assert_eq!(items[1].title, "polish");
    assert_eq!(items[2].column, Column::Icebox);
    // Ids are dense from 1 in file order.
    assert_eq!(items.iter().map(|t| t.id).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn parse_ignores_unknown_headings_and_orphan_bullets() {
    let content = "\
- orphan: dropped

# notes

not a task, wrong section

# queued

real task
";
    let items = parse_board(content);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].title, "real task");
}

#[test]
fn serialize_omits_empty_columns_in_canonical_order() {
    let items = vec![
        TaskItem {
            id: 1,
            title: "b".to_owned(),
            column: Column::Done,
            metadata: IndexMap::new(),
        },
        TaskItem {
            id: 2,
            title: "a".to_owned(),
            column: Column::Queued,
            metadata: IndexMap::new(),
        },
    ];
    let text = serialize_board(&items);
    let queued = text.find("# queued").unwrap();
    let done = text.find("# done").unwrap();
    assert!(queued < done, "canonical order: {text}");
    assert!(!text.contains("# icebox"));
}

#[test]
fn roundtrip_preserves_logical_sequence() {
    let content = "\
# in_progress

migrate db
- claimed: basil
- started: 2026-08-01T10:00:00Z

# blocked

fix login
- reason: awaiting design
";
    let items = parse_board(content);
    let reparsed = parse_board(&serialize_board(&items));
    let logical = |ts: &[TaskItem]| {
        ts.iter().map(|t| (t.title.clone(), t.column, t.metadata.clone())).collect::<Vec<_>>()
    };
    assert_eq!(logical(&items), logical(&reparsed));
}

#[test]
fn summary_counts_in_order() {
    let content = "\
# queued

one

two

# in_progress

three

# blocked

four
";
    let items = parse_board(content);
    assert_eq!(summary_line(&items), "1 active, 1 blocked, 2 queued");
}

#[test]
fn summary_empty_board() {
    assert_eq!(summary_line(&[]), "empty");
    // Only terminal items also reads as empty.
    let done = vec![TaskItem {
        id: 1,
        title: "shipped".to_owned(),
        column: Column::Done,
        metadata: IndexMap::new(),
    }];
    assert_eq!(summary_line(&done), "empty");
}

#[test]
fn command_parse_quoted_titles() {
    let cmd = BoardCommand::parse("add \"fix the nav bar\" icebox").unwrap();
    assert_eq!(
        cmd,
        BoardCommand::Add { title: "fix the nav bar".to_owned(), column: Column::Icebox }
    );

    let cmd = BoardCommand::parse("add \"solo\"").unwrap();
    assert_eq!(cmd, BoardCommand::Add { title: "solo".to_owned(), column: Column::Queued });
}

#[test]
fn command_parse_move_with_reason() {
    let cmd = BoardCommand::parse("move 3 review \"needs eyes\"").unwrap();
    assert_eq!(
        cmd,
        BoardCommand::Move { id: 3, column: Column::Review, reason: Some("needs eyes".to_owned()) }
    );
}

#[test]
fn command_parse_errors_carry_expected_shape() {
    let err = BoardCommand::parse("block 2").unwrap_err();
    assert!(err.contains("block <id> \"reason\""), "err: {err}");

    let err = BoardCommand::parse("move x queued").unwrap_err();
    assert!(err.contains("move <id>"), "err: {err}");

    let err = BoardCommand::parse("explode").unwrap_err();
    assert!(err.contains("unknown verb"), "err: {err}");

    let err = BoardCommand::parse("add \"t\" nowhere").unwrap_err();
    assert!(err.contains("unknown column"), "err: {err}");
}

#[tokio::test]
async fn add_claim_block_roundtrip_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let board = TaskBoard::new(dir.path());

    board
        .execute(BoardCommand::parse("add \"fix nav\" queued").unwrap(), "amber")
        .await
        .unwrap();
    board
        .execute(BoardCommand::parse("add \"polish\" icebox").unwrap(), "amber")
        .await
        .unwrap();
    board.execute(BoardCommand::parse("claim 1").unwrap(), "amber").await.unwrap();
    board
        .execute(BoardCommand::parse("block 1 \"awaiting design\"").unwrap(), "amber")
        .await
        .unwrap();

    // Re-load from disk: the mutations persisted.
    let items = board.load().await;
    assert_eq!(items.len(), 2);
    let blocked = items.iter().find(|t| t.title == "fix nav").unwrap();
    assert_eq!(blocked.column, Column::Blocked);
    assert_eq!(blocked.metadata.get("claimed").map(String::as_str), Some("amber"));
    assert_eq!(blocked.metadata.get("reason").map(String::as_str), Some("awaiting design"));
    assert!(blocked.metadata.contains_key("started"));
    let icebox = items.iter().find(|t| t.title == "polish").unwrap();
    assert_eq!(icebox.column, Column::Icebox);

    assert_eq!(board.summary().await, "1 blocked");
}

#[tokio::test]
async fn detail_returns_added_item() {
    let dir = tempfile::tempdir().unwrap();
    let board = TaskBoard::new(dir.path());
    board
        .execute(BoardCommand::parse("add \"first\"").unwrap(), "s")
        .await
        .unwrap();

    let reply = board.execute(BoardCommand::parse("detail 1").unwrap(), "s").await.unwrap();
    match reply {
        BoardReply::Item(item) => {
            assert_eq!(item.title, "first");
            assert_eq!(item.column, Column::Queued);
        }
        other => panic!("expected item, got {other:?}"),
    }
}

#[tokio::test]
async fn move_then_detail_reports_new_column() {
    let dir = tempfile::tempdir().unwrap();
    let board = TaskBoard::new(dir.path());
    board.execute(BoardCommand::parse("add \"t\"").unwrap(), "s").await.unwrap();
    board.execute(BoardCommand::parse("move 1 review").unwrap(), "s").await.unwrap();

    let reply = board.execute(BoardCommand::parse("detail 1").unwrap(), "s").await.unwrap();
    match reply {
        BoardReply::Item(item) => assert_eq!(item.column, Column::Review),
        other => panic!("expected item, got {other:?}"),
    }
}

#[tokio::test]
async fn list_hides_terminal_columns_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let board = TaskBoard::new(dir.path());
    board.execute(BoardCommand::parse("add \"a\"").unwrap(), "s").await.unwrap();
    board.execute(BoardCommand::parse("add \"b\"").unwrap(), "s").await.unwrap();
    board.execute(BoardCommand::parse("done 2").unwrap(), "s").await.unwrap();

    let reply = board.execute(BoardCommand::parse("list").unwrap(), "s").await.unwrap();
    match reply {
        BoardReply::Items(items) => {
            assert_eq!(items.len(), 1);
            assert_eq!(items[0].title, "a");
        }
        other => panic!("expected items, got {other:?}"),
    }

    // Explicitly listing done shows it.
    let reply = board.execute(BoardCommand::parse("list done").unwrap(), "s").await.unwrap();
    match reply {
        BoardReply::Items(items) => assert_eq!(items.len(), 1),
        other => panic!("expected items, got {other:?}"),
    }
}

#[tokio::test]
async fn board_command_renders_all_columns() {
    let dir = tempfile::tempdir().unwrap();
    let board = TaskBoard::new(dir.path());
    board.execute(BoardCommand::parse("add \"a\"").unwrap(), "s").await.unwrap();

    let reply = board.execute(BoardCommand::Board, "s").await.unwrap();
    match reply {
        BoardReply::Rendered(value) => {
            let queued = value.get("queued").and_then(|v| v.as_array()).unwrap();
            assert_eq!(queued.len(), 1);
            assert!(value.get("trash").and_then(|v| v.as_array()).unwrap().is_empty());
        }
        other => panic!("expected rendered board, got {other:?}"),
    }
}

#[tokio::test]
async fn unparseable_file_is_treated_as_empty() {
    let dir = tempfile::tempdir().unwrap();
    let corral = dir.path().join(HIDDEN_DIR);
    std::fs::create_dir_all(&corral).unwrap();
    std::fs::write(corral.join("tasks-deadbeef.md"), "%% not a board at all %%\n\x00").unwrap();

    let board = TaskBoard::new(dir.path());
    assert!(board.load().await.is_empty());
    assert_eq!(board.summary().await, "empty");

    // The next mutation rewrites the same file into canonical form.
    board.execute(BoardCommand::parse("add \"fresh\"").unwrap(), "s").await.unwrap();
    let items = board.load().await;
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn out_of_band_edits_are_picked_up() {
    let dir = tempfile::tempdir().unwrap();
    let board = TaskBoard::new(dir.path());
    board.execute(BoardCommand::parse("add \"a\"").unwrap(), "s").await.unwrap();

    // A human edits the file directly.
    let corral = dir.path().join(HIDDEN_DIR);
    let path = std::fs::read_dir(&corral)
        .unwrap()
        .flatten()
        .map(|e| e.path())
        .find(|p| p.to_string_lossy().contains("tasks-"))
        .unwrap();
    std::fs::write(&path, "# queued\n\na\n\nhand-added\n").unwrap();

    let items = board.load().await;
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].title, "hand-added");
}
