//! CRM queries against a routed store.
//!
//! Every function takes a plain `rusqlite` connection. Handlers obtain one
//! from their request's [`StoreHandle`](leancrm_storage::StoreHandle), so the
//! same queries serve the default store and every demo store.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::types::{
    CompanyResponse, ContactResponse, CreateCompanyRequest, DealResponse, ListCompaniesResponse,
    ListContactsResponse, ListDealsResponse, ListParams, UpdateCompanyRequest, UserResponse,
};

/// Team assigned to records created through the API.
pub const DEFAULT_TEAM_ID: i64 = 1;

// ============================================================================
// COMPANIES
// ============================================================================

const COMPANY_COLUMNS: &str = "id, name, email, phone, address, website, industry, size, notes, \
                               team_id, created_at, updated_at";

fn company_from_row(row: &Row<'_>) -> rusqlite::Result<CompanyResponse> {
    Ok(CompanyResponse {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        phone: row.get(3)?,
        address: row.get(4)?,
        website: row.get(5)?,
        industry: row.get(6)?,
        size: row.get(7)?,
        notes: row.get(8)?,
        team_id: row.get::<_, Option<i64>>(9)?.unwrap_or(DEFAULT_TEAM_ID),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

pub fn company_list(
    conn: &Connection,
    params: &ListParams,
) -> rusqlite::Result<ListCompaniesResponse> {
    let filter = params.name_filter();
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM companies
         WHERE (?1 IS NULL OR instr(lower(name), lower(?1)) > 0)",
        params![filter],
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM companies
         WHERE (?1 IS NULL OR instr(lower(name), lower(?1)) > 0)
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
        COMPANY_COLUMNS
    );
    let mut stmt = conn.prepare(&sql)?;
    let data = stmt
        .query_map(params![filter, params.limit(), params.offset()], company_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ListCompaniesResponse {
        data,
        total,
        limit: params.limit(),
        offset: params.offset(),
    })
}

pub fn company_get(conn: &Connection, id: i64) -> rusqlite::Result<Option<CompanyResponse>> {
    let sql = format!("SELECT {} FROM companies WHERE id = ?1", COMPANY_COLUMNS);
    conn.query_row(&sql, params![id], company_from_row).optional()
}

pub fn company_create(
    conn: &Connection,
    req: &CreateCompanyRequest,
) -> rusqlite::Result<CompanyResponse> {
    conn.execute(
        "INSERT INTO companies
             (name, email, phone, address, website, industry, size, notes, team_id,
              created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        params![
            req.name.trim(),
            req.email,
            req.phone,
            req.address,
            req.website,
            req.industry,
            req.size,
            req.notes,
            DEFAULT_TEAM_ID,
        ],
    )?;
    let id = conn.last_insert_rowid();
    company_get(conn, id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn company_update(
    conn: &Connection,
    id: i64,
    req: &UpdateCompanyRequest,
) -> rusqlite::Result<Option<CompanyResponse>> {
    let changed = conn.execute(
        "UPDATE companies SET
             name = COALESCE(?2, name),
             email = COALESCE(?3, email),
             phone = COALESCE(?4, phone),
             address = COALESCE(?5, address),
             website = COALESCE(?6, website),
             industry = COALESCE(?7, industry),
             size = COALESCE(?8, size),
             notes = COALESCE(?9, notes),
             updated_at = CURRENT_TIMESTAMP
         WHERE id = ?1",
        params![
            id,
            req.name.as_deref().map(str::trim),
            req.email,
            req.phone,
            req.address,
            req.website,
            req.industry,
            req.size,
            req.notes,
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    company_get(conn, id)
}

/// Returns whether a row was deleted.
pub fn company_delete(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    Ok(conn.execute("DELETE FROM companies WHERE id = ?1", params![id])? > 0)
}

// ============================================================================
// CONTACTS
// ============================================================================

pub fn contact_list(
    conn: &Connection,
    params: &ListParams,
) -> rusqlite::Result<ListContactsResponse> {
    let filter = params.name_filter();
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM contacts
         WHERE (?1 IS NULL OR instr(lower(first_name || ' ' || last_name), lower(?1)) > 0)",
        params![filter],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, first_name, last_name, email, phone, position, company_id, notes, team_id,
                created_at, updated_at
         FROM contacts
         WHERE (?1 IS NULL OR instr(lower(first_name || ' ' || last_name), lower(?1)) > 0)
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let data = stmt
        .query_map(params![filter, params.limit(), params.offset()], |row| {
            Ok(ContactResponse {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get(3)?,
                phone: row.get(4)?,
                position: row.get(5)?,
                company_id: row.get(6)?,
                notes: row.get(7)?,
                team_id: row.get::<_, Option<i64>>(8)?.unwrap_or(DEFAULT_TEAM_ID),
                created_at: row.get(9)?,
                updated_at: row.get(10)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ListContactsResponse {
        data,
        total,
        limit: params.limit(),
        offset: params.offset(),
    })
}

// ============================================================================
// DEALS
// ============================================================================

pub fn deal_list(conn: &Connection, params: &ListParams) -> rusqlite::Result<ListDealsResponse> {
    let filter = params.name_filter();
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM deals
         WHERE (?1 IS NULL OR instr(lower(title), lower(?1)) > 0)",
        params![filter],
        |row| row.get(0),
    )?;

    let mut stmt = conn.prepare(
        "SELECT id, title, description, amount, stage, probability, expected_close_date,
                company_id, contact_id, user_id, team_id, created_at, updated_at
         FROM deals
         WHERE (?1 IS NULL OR instr(lower(title), lower(?1)) > 0)
         ORDER BY created_at DESC, id DESC
         LIMIT ?2 OFFSET ?3",
    )?;
    let data = stmt
        .query_map(params![filter, params.limit(), params.offset()], |row| {
            Ok(DealResponse {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                amount: row.get(3)?,
                stage: row.get(4)?,
                probability: row.get::<_, Option<i64>>(5)?.unwrap_or(0),
                expected_close_date: row.get(6)?,
                company_id: row.get(7)?,
                contact_id: row.get(8)?,
                user_id: row.get(9)?,
                team_id: row.get::<_, Option<i64>>(10)?.unwrap_or(DEFAULT_TEAM_ID),
                created_at: row.get(11)?,
                updated_at: row.get(12)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(ListDealsResponse {
        data,
        total,
        limit: params.limit(),
        offset: params.offset(),
    })
}

// ============================================================================
// USERS
// ============================================================================

/// A user about to be registered, with credentials already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub password_hash: String,
    /// SHA-256 of the access token secret
    pub token_hash: String,
}

/// Insert the user and its access token in one transaction.
///
/// Returns `None` when the email is already registered in this store.
pub fn user_register(
    conn: &mut Connection,
    user: &NewUser,
) -> rusqlite::Result<Option<(UserResponse, i64)>> {
    let tx = conn.transaction()?;

    let taken: bool = tx.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE lower(email) = lower(?1))",
        params![user.email],
        |row| row.get(0),
    )?;
    if taken {
        return Ok(None);
    }

    tx.execute(
        "INSERT INTO users (name, email, password, team_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        params![user.name, user.email, user.password_hash, DEFAULT_TEAM_ID],
    )?;
    let user_id = tx.last_insert_rowid();

    tx.execute(
        "INSERT INTO personal_access_tokens
             (tokenable_type, tokenable_id, name, token, abilities, created_at, updated_at)
         VALUES ('user', ?1, 'auth-token', ?2, '[\"*\"]', CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        params![user_id, user.token_hash],
    )?;
    let token_id = tx.last_insert_rowid();

    tx.commit()?;

    Ok(Some((
        UserResponse {
            id: user_id,
            name: user.name.clone(),
            email: user.email.clone(),
            team_id: DEFAULT_TEAM_ID,
        },
        token_id,
    )))
}
