//! Link operations for the keel store.
//!
//! Links are owned by exactly one issue. An update that carries links replaces
//! the whole set; there is no merge and no dedup by URL.

use rusqlite::{Connection, Transaction, params};
use tracing::debug;

use super::{LINK_COLUMNS, SqliteStore, row_to_link};
use crate::domain::{IssueId, Link, NewLink};
use crate::error::Result;

/// Insert a single link row owned by `issue_id`.
pub(crate) fn insert_link_in_tx(
    tx: &Transaction<'_>,
    issue_id: &IssueId,
    link: &NewLink,
) -> Result<()> {
    tx.execute(
        "INSERT INTO links (id, title, url, issue_id) VALUES (?1, ?2, ?3, ?4)",
        params![SqliteStore::new_id(), link.title, link.url, issue_id.as_str()],
    )?;
    Ok(())
}

/// Replace the whole link set of `issue_id` with `links`.
pub(crate) fn replace_links_in_tx(
    tx: &Transaction<'_>,
    issue_id: &IssueId,
    links: &[NewLink],
) -> Result<()> {
    tx.execute("DELETE FROM links WHERE issue_id = ?1", [issue_id.as_str()])?;
    for link in links {
        insert_link_in_tx(tx, issue_id, link)?;
    }
    debug!(issue_id = %issue_id, count = links.len(), "Replaced links");
    Ok(())
}

/// Load the links owned by `issue_id` in insertion order.
pub(crate) fn links_for_issue(conn: &Connection, issue_id: &IssueId) -> Result<Vec<Link>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {LINK_COLUMNS} FROM links WHERE issue_id = ?1 ORDER BY rowid"
    ))?;

    let links = stmt
        .query_map([issue_id.as_str()], row_to_link)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(links)
}
