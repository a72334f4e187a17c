// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use crate::schema::users;
use chrono::NaiveDateTime;
use controller::{ErrorKind, NewUser, Role, Token, User, UserChanges};
use std::convert::TryFrom;

#[derive(Debug, Clone, Identifiable, Queryable, QueryableByName)]
#[primary_key(user_id)]
#[table_name = "users"]
pub struct UserRow {
    pub user_id: i32,
    pub email: String,
    pub password_hash: String,
    pub display_name: String,
    pub created_at: NaiveDateTime,
    pub is_active: bool,
    pub email_confirmed: bool,
    pub role: String,
    pub token_kind: Option<String>,
    pub token_value: Option<String>,
    pub token_issued_at: Option<NaiveDateTime>,
}

impl TryFrom<UserRow> for User {
    type Error = ErrorKind;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        // The table only allows all three token columns set or none
        let token = match (row.token_kind, row.token_value, row.token_issued_at) {
            (Some(kind), Some(value), Some(issued_at)) => Some(Token {
                kind: kind.parse()?,
                value,
                issued_at,
            }),
            _ => None,
        };

        Ok(User {
            user_id: row.user_id,
            email: row.email,
            password_hash: row.password_hash,
            display_name: row.display_name,
            created_at: row.created_at,
            is_active: row.is_active,
            email_confirmed: row.email_confirmed,
            role: row.role.parse()?,
            token,
        })
    }
}

#[derive(Debug, Clone, Insertable)]
#[table_name = "users"]
pub struct NewUserRow<'a> {
    pub email: &'a str,
    pub password_hash: &'a str,
    pub display_name: &'a str,
    pub role: &'static str,
    pub token_kind: Option<&'static str>,
    pub token_value: Option<&'a str>,
    pub token_issued_at: Option<NaiveDateTime>,
}

impl<'a> From<&'a NewUser> for NewUserRow<'a> {
    fn from(user: &'a NewUser) -> Self {
        let token = user.token.as_ref();

        NewUserRow {
            email: &user.email,
            password_hash: &user.password_hash,
            display_name: &user.display_name,
            role: user.role.as_str(),
            token_kind: token.map(|t| t.kind.as_str()),
            token_value: token.map(|t| t.value.as_str()),
            token_issued_at: token.map(|t| t.issued_at),
        }
    }
}

#[derive(Debug, Clone, Default, AsChangeset)]
#[table_name = "users"]
pub struct UserChangeset {
    pub display_name: Option<String>,
    pub password_hash: Option<String>,
    pub email_confirmed: Option<bool>,
    pub is_active: Option<bool>,
    pub role: Option<String>,
    pub token_kind: Option<Option<String>>,
    pub token_value: Option<Option<String>>,
    pub token_issued_at: Option<Option<NaiveDateTime>>,
}

impl From<&UserChanges> for UserChangeset {
    fn from(changes: &UserChanges) -> Self {
        let mut changeset = UserChangeset {
            display_name: changes.display_name.clone(),
            password_hash: changes.password_hash.clone(),
            email_confirmed: changes.email_confirmed,
            is_active: changes.is_active,
            role: changes.role.map(|r| r.as_str().to_owned()),
            ..Default::default()
        };

        if let Some(token) = &changes.token {
            changeset.token_kind = Some(token.as_ref().map(|t| t.kind.as_str().to_owned()));
            changeset.token_value = Some(token.as_ref().map(|t| t.value.clone()));
            changeset.token_issued_at = Some(token.as_ref().map(|t| t.issued_at));
        }

        changeset
    }
}
