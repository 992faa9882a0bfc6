use std::fs;

use promo_poster::content::{ContentSource, RowCursor, ScheduledPost};

fn sheet(dir: &tempfile::TempDir, body: &str) -> ContentSource {
    let path = dir.path().join("job.csv");
    fs::write(&path, body).unwrap();
    ContentSource::from_csv_path(&path, true).unwrap()
}

#[test]
fn cursor_rotates_and_wraps() {
    let dir = tempfile::tempdir().unwrap();
    let source = sheet(&dir, "message,image\nFirst\nSecond\nThird\n");
    let cursor = RowCursor::new(dir.path().join(".current_row_index"));

    let rows: Vec<usize> = (0..4)
        .map(|_| source.next_post(&cursor).unwrap().unwrap().row)
        .collect();

    assert_eq!(rows, vec![0, 1, 2, 0]);
    assert_eq!(fs::read_to_string(cursor.path()).unwrap(), "1");
}

#[test]
fn blank_rows_are_skipped_and_consumed() {
    let dir = tempfile::tempdir().unwrap();
    let source = sheet(&dir, "message,image\nFirst\n\"  \",\nhttps://amzn.to/deal\n");
    let cursor = RowCursor::new(dir.path().join("cursor"));
    fs::write(cursor.path(), "1").unwrap();

    let selected = source.next_post(&cursor).unwrap().unwrap();

    assert_eq!(selected.row, 2);
    assert_eq!(
        selected.post,
        ScheduledPost::Promotion {
            affiliate_link: "https://amzn.to/deal".into()
        }
    );
    assert_eq!(cursor.peek().unwrap(), 0);
}

#[test]
fn corrupt_or_out_of_range_cursor_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let source = sheet(&dir, "message\nA\nB\n");
    let cursor = RowCursor::new(dir.path().join("cursor"));

    fs::write(cursor.path(), "garbage").unwrap();
    assert_eq!(source.next_post(&cursor).unwrap().unwrap().row, 0);

    fs::write(cursor.path(), "7").unwrap();
    assert_eq!(source.next_post(&cursor).unwrap().unwrap().row, 1);
}

#[test]
fn sheet_without_usable_rows_yields_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let cursor = RowCursor::new(dir.path().join("cursor"));

    let empty = sheet(&dir, "message,image\n");
    assert!(empty.is_empty());
    assert!(empty.next_post(&cursor).unwrap().is_none());

    let blanks = ContentSource::from_rows([("", "https://cdn.example.com/a.jpg"), (" ", "")]);
    assert!(blanks.next_post(&cursor).unwrap().is_none());
}

#[test]
fn lease_holds_value_until_commit() {
    let dir = tempfile::tempdir().unwrap();
    let cursor = RowCursor::new(dir.path().join("cursor"));

    {
        let mut lease = cursor.lease().unwrap();
        assert_eq!(lease.index(), 0);
        lease.commit(42).unwrap();
        assert_eq!(lease.index(), 42);
    }

    assert_eq!(cursor.peek().unwrap(), 42);
}
