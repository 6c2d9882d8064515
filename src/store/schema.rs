pub const SCHEMA: &str = r#"
-- Principals: users, service accounts and services
CREATE TABLE IF NOT EXISTS principals (
    principal_id INTEGER PRIMARY KEY AUTOINCREMENT,
    principal_uid TEXT NOT NULL UNIQUE,
    principal_kind TEXT NOT NULL,
    principal_display_name TEXT NOT NULL,
    principal_email TEXT NOT NULL,
    principal_created TEXT NOT NULL,
    principal_updated TEXT NOT NULL
);

-- Spaces form a tree; a space with children cannot be deleted
CREATE TABLE IF NOT EXISTS spaces (
    space_id INTEGER PRIMARY KEY AUTOINCREMENT,
    space_parent_id INTEGER REFERENCES spaces(space_id) ON DELETE RESTRICT,
    space_uid TEXT NOT NULL,
    space_display_name TEXT NOT NULL DEFAULT '',
    space_description TEXT NOT NULL DEFAULT '',
    space_created_by INTEGER NOT NULL,
    space_created TEXT NOT NULL,
    space_updated TEXT NOT NULL
);

-- Repositories are leaves owned by exactly one space
CREATE TABLE IF NOT EXISTS repositories (
    repo_id INTEGER PRIMARY KEY AUTOINCREMENT,
    repo_parent_id INTEGER NOT NULL REFERENCES spaces(space_id) ON DELETE RESTRICT,
    repo_uid TEXT NOT NULL,
    repo_description TEXT NOT NULL DEFAULT '',
    repo_created_by INTEGER NOT NULL,
    repo_created TEXT NOT NULL,
    repo_updated TEXT NOT NULL
);

-- One namespace shared by spaces and repositories. Rows are deleted
-- together with the resource they point at.
CREATE TABLE IF NOT EXISTS paths (
    path_id INTEGER PRIMARY KEY AUTOINCREMENT,
    path_value TEXT NOT NULL UNIQUE,
    path_is_primary INTEGER NOT NULL DEFAULT 0,
    path_target_kind TEXT NOT NULL CHECK (path_target_kind IN ('space', 'repo')),
    path_target_id INTEGER NOT NULL,
    path_created_by INTEGER NOT NULL,
    path_created TEXT NOT NULL,
    path_updated TEXT NOT NULL
);

-- Role grants; created_by may outlive the granting principal
CREATE TABLE IF NOT EXISTS memberships (
    membership_space_id INTEGER NOT NULL REFERENCES spaces(space_id) ON DELETE CASCADE,
    membership_principal_id INTEGER NOT NULL REFERENCES principals(principal_id) ON DELETE CASCADE,
    membership_created_by INTEGER NOT NULL,
    membership_created TEXT NOT NULL,
    membership_updated TEXT NOT NULL,
    membership_role TEXT NOT NULL,
    PRIMARY KEY (membership_space_id, membership_principal_id)
);

-- Create indexes
CREATE INDEX IF NOT EXISTS idx_spaces_parent ON spaces(space_parent_id);
CREATE INDEX IF NOT EXISTS idx_repositories_parent ON repositories(repo_parent_id);
CREATE INDEX IF NOT EXISTS idx_paths_target ON paths(path_target_kind, path_target_id);
CREATE UNIQUE INDEX IF NOT EXISTS idx_paths_primary
    ON paths(path_target_kind, path_target_id) WHERE path_is_primary = 1;
CREATE INDEX IF NOT EXISTS idx_memberships_principal ON memberships(membership_principal_id);
"#;
