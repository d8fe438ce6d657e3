//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Linkharvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Crawl targets
CREATE TABLE IF NOT EXISTS websites (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    domain TEXT NOT NULL,
    crawl_depth INTEGER NOT NULL,
    max_links INTEGER NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_websites_domain ON websites(domain);
CREATE INDEX IF NOT EXISTS idx_websites_status ON websites(status);

-- One row per crawl attempt
CREATE TABLE IF NOT EXISTS crawl_tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id INTEGER NOT NULL REFERENCES websites(id),
    strategy TEXT NOT NULL,
    task_type TEXT NOT NULL,
    status TEXT NOT NULL,
    total_links INTEGER NOT NULL DEFAULT 0,
    valid_links INTEGER NOT NULL DEFAULT 0,
    invalid_links INTEGER NOT NULL DEFAULT 0,
    new_links INTEGER NOT NULL DEFAULT 0,
    download_failed INTEGER NOT NULL DEFAULT 0,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    error_message TEXT,
    -- Unix milliseconds of the owning worker's last sign of life
    heartbeat_at INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_tasks_website ON crawl_tasks(website_id, started_at);
CREATE INDEX IF NOT EXISTS idx_tasks_status ON crawl_tasks(status);

-- At most one pending/running task per website
CREATE UNIQUE INDEX IF NOT EXISTS idx_tasks_one_active
    ON crawl_tasks(website_id) WHERE status IN ('pending', 'running');

-- Discovered links
CREATE TABLE IF NOT EXISTS crawled_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    website_id INTEGER NOT NULL REFERENCES websites(id),
    task_id INTEGER REFERENCES crawl_tasks(id) ON DELETE SET NULL,
    url TEXT NOT NULL,
    domain TEXT NOT NULL,
    link_type TEXT NOT NULL,
    status_code INTEGER,
    content_type TEXT,
    crawl_count INTEGER NOT NULL DEFAULT 1,
    first_crawled_at TEXT NOT NULL,
    last_crawled_at TEXT NOT NULL,
    UNIQUE(website_id, url)
);

CREATE INDEX IF NOT EXISTS idx_links_domain ON crawled_links(domain);
CREATE INDEX IF NOT EXISTS idx_links_type ON crawled_links(link_type);
CREATE INDEX IF NOT EXISTS idx_links_last_crawled ON crawled_links(last_crawled_at);

-- Append-only task events
CREATE TABLE IF NOT EXISTS crawl_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL REFERENCES crawl_tasks(id) ON DELETE CASCADE,
    level TEXT NOT NULL,
    message TEXT NOT NULL,
    details TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_logs_task ON crawl_logs(task_id, created_at);
CREATE INDEX IF NOT EXISTS idx_logs_level ON crawl_logs(level);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
