//! Per-kind store codecs.
//!
//! Every kind persists through four operations over a transaction: `insert`,
//! `update`, `load`, `remove`. The `Node` kind is the base codec: its row
//! lives in the generic `node` table and its edges in `node_associations`,
//! and every other kind's codec performs the base work in addition to its
//! own kind table. Edge rows are never diffed: an update wholesale deletes
//! the node's association rows and streams the current up/down sets back,
//! so the stored edge set for a node always matches the in-memory view
//! after any save.
//!
//! [`REGISTRY`] is the companion table keyed by kind tag holding the stable
//! name, the kind table, and the four codec function pointers. Kinds with no
//! kind table surface [`StoreError::UnknownKind`] on the write paths, while
//! their `load` is a silent no-op returning false so a raw node can safely
//! be fetched.

use rusqlite::{params, OptionalExtension, Transaction};

use reqgraph_core::{NodeId, NodeKind, NodeRecord, Payload};

use crate::error::StoreError;

/// Direction tag on an edge row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    pub fn parse(s: &str) -> Direction {
        match s {
            "up" => Direction::Up,
            _ => Direction::Down,
        }
    }
}

// ---------------------------------------------------------------------------
// Base codec: the node table and the edge table
// ---------------------------------------------------------------------------

/// Returns true if the id has a row in the generic `node` table.
pub fn node_in_db(tx: &Transaction<'_>, id: &str) -> Result<bool, StoreError> {
    let found: Option<String> = tx
        .query_row("SELECT id FROM node WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(found.is_some())
}

/// Returns true if the id has a row in the named kind table.
pub fn row_in_table(tx: &Transaction<'_>, table: &str, id: &str) -> Result<bool, StoreError> {
    let sql = format!("SELECT id FROM {table} WHERE id = ?1");
    let found: Option<String> = tx
        .query_row(&sql, params![id], |row| row.get(0))
        .optional()?;
    Ok(found.is_some())
}

/// Streams the record's current up/down sets into `node_associations`.
fn write_edges(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO node_associations (id, neighbor, direction) VALUES (?1, ?2, ?3)",
    )?;
    let id = rec.id_string();
    for neighbor in &rec.up {
        stmt.execute(params![id, neighbor.to_string(), Direction::Up.as_str()])?;
    }
    for neighbor in &rec.down {
        stmt.execute(params![id, neighbor.to_string(), Direction::Down.as_str()])?;
    }
    Ok(())
}

/// Base insert: node row plus streamed edges.
fn node_insert(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    tx.execute(
        "INSERT INTO node (id, kind_name) VALUES (?1, ?2)",
        params![rec.id_string(), rec.kind_name()],
    )?;
    write_edges(tx, rec)
}

/// Base update: clear the node's association rows, then stream the current
/// sets back. The node row itself carries nothing worth rewriting.
fn node_update(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM node_associations WHERE id = ?1",
        params![rec.id_string()],
    )?;
    write_edges(tx, rec)
}

/// Base remove: every edge mentioning the identifier on either side, then
/// the node row.
fn node_remove(tx: &Transaction<'_>, id: &str) -> Result<(), StoreError> {
    tx.execute(
        "DELETE FROM node_associations WHERE id = ?1 OR neighbor = ?1",
        params![id],
    )?;
    tx.execute("DELETE FROM node WHERE id = ?1", params![id])?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Kind-specific rows
// ---------------------------------------------------------------------------

fn specific_insert_row(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    let id = rec.id_string();
    match rec.payload() {
        Payload::Node => {}
        Payload::ServerLocator(_) => {
            return Err(StoreError::UnknownKind {
                kind: rec.kind_name(),
            });
        }
        Payload::GraphNode(d) => {
            tx.execute(
                "INSERT INTO graph_node (id, title) VALUES (?1, ?2)",
                params![id, d.title],
            )?;
        }
        Payload::Organization(d) => {
            tx.execute(
                "INSERT INTO organization (id, locked, name) VALUES (?1, ?2, ?3)",
                params![id, d.is_locked(), d.name()],
            )?;
        }
        Payload::Product(c) => {
            let d = c.data();
            tx.execute(
                "INSERT INTO product (id, title, description) VALUES (?1, ?2, ?3)",
                params![id, d.title, d.description],
            )?;
        }
        Payload::Project(d) => {
            tx.execute(
                "INSERT INTO project (id, name, description) VALUES (?1, ?2, ?3)",
                params![id, d.name, d.description],
            )?;
        }
        Payload::Requirement(c) => {
            let d = c.data();
            tx.execute(
                "INSERT INTO requirement (id, title, text, functional) VALUES (?1, ?2, ?3, ?4)",
                params![id, d.title, d.text, d.functional],
            )?;
        }
        Payload::Story(c) => {
            let d = c.data();
            tx.execute(
                "INSERT INTO story (id, title, goal, benefit) VALUES (?1, ?2, ?3, ?4)",
                params![id, d.title, d.goal, d.benefit],
            )?;
        }
        Payload::UseCase(c) => {
            tx.execute(
                "INSERT INTO use_case (id, name) VALUES (?1, ?2)",
                params![id, c.data().name],
            )?;
        }
        Payload::Text(d) => {
            tx.execute(
                "INSERT INTO text (id, text) VALUES (?1, ?2)",
                params![id, d.text],
            )?;
        }
        Payload::Completed(d) => {
            tx.execute(
                "INSERT INTO completed (id, description) VALUES (?1, ?2)",
                params![id, d.description],
            )?;
        }
        Payload::KeyValue(d) => {
            tx.execute(
                "INSERT INTO keyvalue (id, key, value) VALUES (?1, ?2, ?3)",
                params![id, d.key, d.value],
            )?;
        }
        Payload::TimeEstimate(d) => {
            tx.execute(
                "INSERT INTO time_estimate (id, text, estimate, started, start) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id, d.text, d.estimate, d.started, d.start],
            )?;
        }
        Payload::Effort(d) => {
            tx.execute(
                "INSERT INTO effort (id, text, effort) VALUES (?1, ?2, ?3)",
                params![id, d.text, d.effort],
            )?;
        }
        Payload::Role(d) => {
            tx.execute(
                "INSERT INTO role (id, who) VALUES (?1, ?2)",
                params![id, d.who],
            )?;
        }
        Payload::Actor(d) => {
            tx.execute(
                "INSERT INTO actor (id, actor) VALUES (?1, ?2)",
                params![id, d.actor],
            )?;
        }
        Payload::Goal(d) => {
            tx.execute(
                "INSERT INTO goal (id, action, outcome, context, target_date, \
                 target_date_confidence, alignment) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    d.action,
                    d.outcome,
                    d.context,
                    d.target_date,
                    d.target_date_confidence,
                    d.alignment
                ],
            )?;
        }
        Payload::Purpose(d) => {
            tx.execute(
                "INSERT INTO purpose (id, description, deadline, deadline_confidence) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, d.description, d.deadline, d.deadline_confidence],
            )?;
        }
        Payload::Person(d) => {
            tx.execute(
                "INSERT INTO person (id, first_name, last_name) VALUES (?1, ?2, ?3)",
                params![id, d.first_name, d.last_name],
            )?;
        }
        Payload::EmailAddress(d) => {
            tx.execute(
                "INSERT INTO email_address (id, address) VALUES (?1, ?2)",
                params![id, d.address],
            )?;
        }
        Payload::PhoneNumber(d) => {
            tx.execute(
                "INSERT INTO phone_number (id, countrycode, number, phone_type) \
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, d.country_code, d.number, d.phone_type],
            )?;
        }
        Payload::InternationalAddress(d) => {
            tx.execute(
                "INSERT INTO international_address (id, country_code, address_lines, \
                 locality, postal_code) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    d.country_code,
                    d.address_lines.map(|n| n.to_string()),
                    d.locality,
                    d.postal_code
                ],
            )?;
        }
        Payload::UsAddress(d) => {
            tx.execute(
                "INSERT INTO us_address (id, address_lines, city, state, zipcode) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    d.address_lines.map(|n| n.to_string()),
                    d.city,
                    d.state,
                    d.zipcode
                ],
            )?;
        }
        Payload::Event(d) => {
            tx.execute(
                "INSERT INTO event (id, name, description) VALUES (?1, ?2, ?3)",
                params![id, d.name, d.description],
            )?;
        }
        Payload::RecurringTodo(d) => {
            tx.execute(
                "INSERT INTO recurring_todo (id, description, created, recurring_interval, \
                 seconds_flag, dom_flag, doy_flag) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    d.description,
                    d.created,
                    d.recurring_interval,
                    d.seconds_flag,
                    d.day_of_month_flag,
                    d.day_of_year_flag
                ],
            )?;
        }
        Payload::Todo(d) => {
            tx.execute(
                "INSERT INTO todo (id, description, created, due, completed, \
                 date_completed, spawned_from) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    id,
                    d.description,
                    d.created,
                    d.due,
                    d.completed,
                    d.date_completed,
                    d.spawned_from.map(|n| n.to_string())
                ],
            )?;
        }
    }
    Ok(())
}

fn specific_update_row(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    let id = rec.id_string();
    match rec.payload() {
        Payload::Node => {}
        Payload::ServerLocator(_) => {
            return Err(StoreError::UnknownKind {
                kind: rec.kind_name(),
            });
        }
        Payload::GraphNode(d) => {
            tx.execute(
                "UPDATE graph_node SET title = ?1 WHERE id = ?2",
                params![d.title, id],
            )?;
        }
        Payload::Organization(d) => {
            tx.execute(
                "UPDATE organization SET locked = ?1, name = ?2 WHERE id = ?3",
                params![d.is_locked(), d.name(), id],
            )?;
        }
        Payload::Product(c) => {
            let d = c.data();
            tx.execute(
                "UPDATE product SET title = ?1, description = ?2 WHERE id = ?3",
                params![d.title, d.description, id],
            )?;
        }
        Payload::Project(d) => {
            tx.execute(
                "UPDATE project SET name = ?1, description = ?2 WHERE id = ?3",
                params![d.name, d.description, id],
            )?;
        }
        Payload::Requirement(c) => {
            let d = c.data();
            tx.execute(
                "UPDATE requirement SET title = ?1, text = ?2, functional = ?3 WHERE id = ?4",
                params![d.title, d.text, d.functional, id],
            )?;
        }
        Payload::Story(c) => {
            let d = c.data();
            tx.execute(
                "UPDATE story SET title = ?1, goal = ?2, benefit = ?3 WHERE id = ?4",
                params![d.title, d.goal, d.benefit, id],
            )?;
        }
        Payload::UseCase(c) => {
            tx.execute(
                "UPDATE use_case SET name = ?1 WHERE id = ?2",
                params![c.data().name, id],
            )?;
        }
        Payload::Text(d) => {
            tx.execute(
                "UPDATE text SET text = ?1 WHERE id = ?2",
                params![d.text, id],
            )?;
        }
        Payload::Completed(d) => {
            tx.execute(
                "UPDATE completed SET description = ?1 WHERE id = ?2",
                params![d.description, id],
            )?;
        }
        Payload::KeyValue(d) => {
            tx.execute(
                "UPDATE keyvalue SET key = ?1, value = ?2 WHERE id = ?3",
                params![d.key, d.value, id],
            )?;
        }
        Payload::TimeEstimate(d) => {
            tx.execute(
                "UPDATE time_estimate SET text = ?1, estimate = ?2, started = ?3, \
                 start = ?4 WHERE id = ?5",
                params![d.text, d.estimate, d.started, d.start, id],
            )?;
        }
        Payload::Effort(d) => {
            tx.execute(
                "UPDATE effort SET text = ?1, effort = ?2 WHERE id = ?3",
                params![d.text, d.effort, id],
            )?;
        }
        Payload::Role(d) => {
            tx.execute(
                "UPDATE role SET who = ?1 WHERE id = ?2",
                params![d.who, id],
            )?;
        }
        Payload::Actor(d) => {
            tx.execute(
                "UPDATE actor SET actor = ?1 WHERE id = ?2",
                params![d.actor, id],
            )?;
        }
        Payload::Goal(d) => {
            tx.execute(
                "UPDATE goal SET action = ?1, outcome = ?2, context = ?3, target_date = ?4, \
                 target_date_confidence = ?5, alignment = ?6 WHERE id = ?7",
                params![
                    d.action,
                    d.outcome,
                    d.context,
                    d.target_date,
                    d.target_date_confidence,
                    d.alignment,
                    id
                ],
            )?;
        }
        Payload::Purpose(d) => {
            tx.execute(
                "UPDATE purpose SET description = ?1, deadline = ?2, \
                 deadline_confidence = ?3 WHERE id = ?4",
                params![d.description, d.deadline, d.deadline_confidence, id],
            )?;
        }
        Payload::Person(d) => {
            tx.execute(
                "UPDATE person SET first_name = ?1, last_name = ?2 WHERE id = ?3",
                params![d.first_name, d.last_name, id],
            )?;
        }
        Payload::EmailAddress(d) => {
            tx.execute(
                "UPDATE email_address SET address = ?1 WHERE id = ?2",
                params![d.address, id],
            )?;
        }
        Payload::PhoneNumber(d) => {
            tx.execute(
                "UPDATE phone_number SET countrycode = ?1, number = ?2, phone_type = ?3 \
                 WHERE id = ?4",
                params![d.country_code, d.number, d.phone_type, id],
            )?;
        }
        Payload::InternationalAddress(d) => {
            tx.execute(
                "UPDATE international_address SET country_code = ?1, address_lines = ?2, \
                 locality = ?3, postal_code = ?4 WHERE id = ?5",
                params![
                    d.country_code,
                    d.address_lines.map(|n| n.to_string()),
                    d.locality,
                    d.postal_code,
                    id
                ],
            )?;
        }
        Payload::UsAddress(d) => {
            tx.execute(
                "UPDATE us_address SET address_lines = ?1, city = ?2, state = ?3, \
                 zipcode = ?4 WHERE id = ?5",
                params![
                    d.address_lines.map(|n| n.to_string()),
                    d.city,
                    d.state,
                    d.zipcode,
                    id
                ],
            )?;
        }
        Payload::Event(d) => {
            tx.execute(
                "UPDATE event SET name = ?1, description = ?2 WHERE id = ?3",
                params![d.name, d.description, id],
            )?;
        }
        Payload::RecurringTodo(d) => {
            tx.execute(
                "UPDATE recurring_todo SET description = ?1, created = ?2, \
                 recurring_interval = ?3, seconds_flag = ?4, dom_flag = ?5, doy_flag = ?6 \
                 WHERE id = ?7",
                params![
                    d.description,
                    d.created,
                    d.recurring_interval,
                    d.seconds_flag,
                    d.day_of_month_flag,
                    d.day_of_year_flag,
                    id
                ],
            )?;
        }
        Payload::Todo(d) => {
            tx.execute(
                "UPDATE todo SET description = ?1, created = ?2, due = ?3, completed = ?4, \
                 date_completed = ?5, spawned_from = ?6 WHERE id = ?7",
                params![
                    d.description,
                    d.created,
                    d.due,
                    d.completed,
                    d.date_completed,
                    d.spawned_from.map(|n| n.to_string()),
                    id
                ],
            )?;
        }
    }
    Ok(())
}

fn specific_load_row(tx: &Transaction<'_>, rec: &mut NodeRecord) -> Result<bool, StoreError> {
    let id = rec.id_string();
    match rec.payload_raw_mut() {
        Payload::Node => Ok(true),
        Payload::ServerLocator(_) => Ok(false),
        Payload::GraphNode(d) => {
            let row = tx
                .query_row(
                    "SELECT title FROM graph_node WHERE id = ?1",
                    params![id],
                    |r| r.get::<_, String>(0),
                )
                .optional()?;
            match row {
                Some(title) => {
                    d.title = title;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Organization(d) => {
            let row = tx
                .query_row(
                    "SELECT locked, name FROM organization WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get::<_, bool>(0)?, r.get::<_, String>(1)?)),
                )
                .optional()?;
            match row {
                Some((locked, name)) => {
                    d.set_name_raw(name);
                    if locked {
                        d.lock();
                    }
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Product(c) => {
            let row = tx
                .query_row(
                    "SELECT title, description FROM product WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
                )
                .optional()?;
            match row {
                Some((title, description)) => {
                    let d = c.data_raw_mut();
                    d.title = title;
                    d.description = description;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Project(d) => {
            let row = tx
                .query_row(
                    "SELECT name, description FROM project WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
                )
                .optional()?;
            match row {
                Some((name, description)) => {
                    d.name = name;
                    d.description = description;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Requirement(c) => {
            let row = tx
                .query_row(
                    "SELECT title, text, functional FROM requirement WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, bool>(2)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((title, text, functional)) => {
                    let d = c.data_raw_mut();
                    d.title = title;
                    d.text = text;
                    d.functional = functional;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Story(c) => {
            let row = tx
                .query_row(
                    "SELECT title, goal, benefit FROM story WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((title, goal, benefit)) => {
                    let d = c.data_raw_mut();
                    d.title = title;
                    d.goal = goal;
                    d.benefit = benefit;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::UseCase(c) => {
            let row = tx
                .query_row(
                    "SELECT name FROM use_case WHERE id = ?1",
                    params![id],
                    |r| r.get::<_, String>(0),
                )
                .optional()?;
            match row {
                Some(name) => {
                    c.data_raw_mut().name = name;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Text(d) => {
            let row = tx
                .query_row("SELECT text FROM text WHERE id = ?1", params![id], |r| {
                    r.get::<_, String>(0)
                })
                .optional()?;
            match row {
                Some(text) => {
                    d.text = text;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Completed(d) => {
            let row = tx
                .query_row(
                    "SELECT description FROM completed WHERE id = ?1",
                    params![id],
                    |r| r.get::<_, String>(0),
                )
                .optional()?;
            match row {
                Some(description) => {
                    d.description = description;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::KeyValue(d) => {
            let row = tx
                .query_row(
                    "SELECT key, value FROM keyvalue WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
                )
                .optional()?;
            match row {
                Some((key, value)) => {
                    d.key = key;
                    d.value = value;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::TimeEstimate(d) => {
            let row = tx
                .query_row(
                    "SELECT text, estimate, started, start FROM time_estimate WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, i64>(1)?,
                            r.get::<_, bool>(2)?,
                            r.get::<_, i64>(3)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((text, estimate, started, start)) => {
                    d.text = text;
                    d.estimate = estimate;
                    d.started = started;
                    d.start = start;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Effort(d) => {
            let row = tx
                .query_row(
                    "SELECT text, effort FROM effort WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)),
                )
                .optional()?;
            match row {
                Some((text, effort)) => {
                    d.text = text;
                    d.effort = effort;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Role(d) => {
            let row = tx
                .query_row("SELECT who FROM role WHERE id = ?1", params![id], |r| {
                    r.get::<_, String>(0)
                })
                .optional()?;
            match row {
                Some(who) => {
                    d.who = who;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Actor(d) => {
            let row = tx
                .query_row("SELECT actor FROM actor WHERE id = ?1", params![id], |r| {
                    r.get::<_, String>(0)
                })
                .optional()?;
            match row {
                Some(actor) => {
                    d.actor = actor;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Goal(d) => {
            let row = tx
                .query_row(
                    "SELECT action, outcome, context, target_date, target_date_confidence, \
                     alignment FROM goal WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, i64>(3)?,
                            r.get::<_, String>(4)?,
                            r.get::<_, String>(5)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((action, outcome, context, target_date, confidence, alignment)) => {
                    d.action = action;
                    d.outcome = outcome;
                    d.context = context;
                    d.target_date = target_date;
                    d.target_date_confidence = confidence;
                    d.alignment = alignment;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Purpose(d) => {
            let row = tx
                .query_row(
                    "SELECT description, deadline, deadline_confidence FROM purpose \
                     WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, i64>(1)?,
                            r.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((description, deadline, confidence)) => {
                    d.description = description;
                    d.deadline = deadline;
                    d.deadline_confidence = confidence;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Person(d) => {
            let row = tx
                .query_row(
                    "SELECT first_name, last_name FROM person WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
                )
                .optional()?;
            match row {
                Some((first_name, last_name)) => {
                    d.first_name = first_name;
                    d.last_name = last_name;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::EmailAddress(d) => {
            let row = tx
                .query_row(
                    "SELECT address FROM email_address WHERE id = ?1",
                    params![id],
                    |r| r.get::<_, String>(0),
                )
                .optional()?;
            match row {
                Some(address) => {
                    d.address = address;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::PhoneNumber(d) => {
            let row = tx
                .query_row(
                    "SELECT countrycode, number, phone_type FROM phone_number WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((country_code, number, phone_type)) => {
                    d.country_code = country_code;
                    d.number = number;
                    d.phone_type = phone_type;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::InternationalAddress(d) => {
            let row = tx
                .query_row(
                    "SELECT country_code, address_lines, locality, postal_code \
                     FROM international_address WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, Option<String>>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((country_code, address_lines, locality, postal_code)) => {
                    d.country_code = country_code;
                    d.address_lines = address_lines.and_then(|s| NodeId::parse(&s).ok());
                    d.locality = locality;
                    d.postal_code = postal_code;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::UsAddress(d) => {
            let row = tx
                .query_row(
                    "SELECT address_lines, city, state, zipcode FROM us_address WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, Option<String>>(0)?,
                            r.get::<_, String>(1)?,
                            r.get::<_, String>(2)?,
                            r.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((address_lines, city, state, zipcode)) => {
                    d.address_lines = address_lines.and_then(|s| NodeId::parse(&s).ok());
                    d.city = city;
                    d.state = state;
                    d.zipcode = zipcode;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Event(d) => {
            let row = tx
                .query_row(
                    "SELECT name, description FROM event WHERE id = ?1",
                    params![id],
                    |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
                )
                .optional()?;
            match row {
                Some((name, description)) => {
                    d.name = name;
                    d.description = description;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::RecurringTodo(d) => {
            let row = tx
                .query_row(
                    "SELECT description, created, recurring_interval, seconds_flag, \
                     dom_flag, doy_flag FROM recurring_todo WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, i64>(1)?,
                            r.get::<_, i64>(2)?,
                            r.get::<_, bool>(3)?,
                            r.get::<_, bool>(4)?,
                            r.get::<_, bool>(5)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((description, created, interval, seconds, dom, doy)) => {
                    d.description = description;
                    d.created = created;
                    d.recurring_interval = interval;
                    d.seconds_flag = seconds;
                    d.day_of_month_flag = dom;
                    d.day_of_year_flag = doy;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
        Payload::Todo(d) => {
            let row = tx
                .query_row(
                    "SELECT description, created, due, completed, date_completed, \
                     spawned_from FROM todo WHERE id = ?1",
                    params![id],
                    |r| {
                        Ok((
                            r.get::<_, String>(0)?,
                            r.get::<_, i64>(1)?,
                            r.get::<_, i64>(2)?,
                            r.get::<_, bool>(3)?,
                            r.get::<_, i64>(4)?,
                            r.get::<_, Option<String>>(5)?,
                        ))
                    },
                )
                .optional()?;
            match row {
                Some((description, created, due, completed, date_completed, spawned)) => {
                    d.description = description;
                    d.created = created;
                    d.due = due;
                    d.completed = completed;
                    d.date_completed = date_completed;
                    d.spawned_from = spawned.and_then(|s| NodeId::parse(&s).ok());
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }
}

fn specific_remove_row(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    if let Some(table) = rec.kind().table_name() {
        let sql = format!("DELETE FROM {table} WHERE id = ?1");
        tx.execute(&sql, params![rec.id_string()])?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// The codec registry
// ---------------------------------------------------------------------------

type WriteFn = fn(&Transaction<'_>, &NodeRecord) -> Result<(), StoreError>;
type LoadFn = fn(&Transaction<'_>, &mut NodeRecord) -> Result<bool, StoreError>;

/// One registry entry: stable name, kind table, and the four codec
/// operations for that kind.
pub struct KindCodec {
    pub kind: NodeKind,
    pub name: &'static str,
    pub table: Option<&'static str>,
    pub insert: WriteFn,
    pub update: WriteFn,
    pub load: LoadFn,
    pub remove: WriteFn,
}

fn tabled_insert(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    node_insert(tx, rec)?;
    specific_insert_row(tx, rec)
}

fn tabled_update(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    node_update(tx, rec)?;
    specific_update_row(tx, rec)
}

fn tabled_remove(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    node_remove(tx, &rec.id_string())?;
    specific_remove_row(tx, rec)
}

fn base_insert(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    node_insert(tx, rec)
}

fn base_update(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    node_update(tx, rec)
}

fn base_load(_tx: &Transaction<'_>, _rec: &mut NodeRecord) -> Result<bool, StoreError> {
    // The only data a raw node carries is its identifier, which the caller
    // already has.
    Ok(true)
}

fn base_remove(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    node_remove(tx, &rec.id_string())
}

fn unknown_write(_tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    Err(StoreError::UnknownKind {
        kind: rec.kind_name(),
    })
}

fn unknown_load(_tx: &Transaction<'_>, _rec: &mut NodeRecord) -> Result<bool, StoreError> {
    Ok(false)
}

const fn tabled(kind: NodeKind) -> KindCodec {
    KindCodec {
        kind,
        name: kind.name(),
        table: kind.table_name(),
        insert: tabled_insert,
        update: tabled_update,
        load: specific_load_row,
        remove: tabled_remove,
    }
}

/// Registry of every kind's codec, keyed by kind tag.
pub static REGISTRY: [KindCodec; 26] = [
    KindCodec {
        kind: NodeKind::Node,
        name: NodeKind::Node.name(),
        table: None,
        insert: base_insert,
        update: base_update,
        load: base_load,
        remove: base_remove,
    },
    tabled(NodeKind::GraphNode),
    tabled(NodeKind::Organization),
    tabled(NodeKind::Product),
    tabled(NodeKind::Project),
    tabled(NodeKind::Requirement),
    tabled(NodeKind::Story),
    tabled(NodeKind::UseCase),
    tabled(NodeKind::Text),
    tabled(NodeKind::Completed),
    tabled(NodeKind::KeyValue),
    tabled(NodeKind::TimeEstimate),
    tabled(NodeKind::Effort),
    tabled(NodeKind::Role),
    tabled(NodeKind::Actor),
    tabled(NodeKind::Goal),
    tabled(NodeKind::Purpose),
    tabled(NodeKind::Person),
    tabled(NodeKind::EmailAddress),
    tabled(NodeKind::PhoneNumber),
    tabled(NodeKind::InternationalAddress),
    tabled(NodeKind::UsAddress),
    tabled(NodeKind::Event),
    tabled(NodeKind::RecurringTodo),
    tabled(NodeKind::Todo),
    KindCodec {
        kind: NodeKind::ServerLocatorNode,
        name: NodeKind::ServerLocatorNode.name(),
        table: None,
        insert: unknown_write,
        update: unknown_write,
        load: unknown_load,
        remove: unknown_write,
    },
];

/// Looks the codec up by kind tag.
pub fn codec_for(kind: NodeKind) -> &'static KindCodec {
    REGISTRY
        .iter()
        .find(|c| c.kind == kind)
        .unwrap_or(&REGISTRY[0])
}

/// Looks the codec up by stable name; unknown names get the base codec.
pub fn codec_by_name(name: &str) -> &'static KindCodec {
    codec_for(NodeKind::from_name_or_node(name))
}

// ---------------------------------------------------------------------------
// Save/load entry points
// ---------------------------------------------------------------------------

/// Ensures the node row exists and rewrites the node's association rows to
/// exactly its current up/down sets.
pub fn store_edges(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    let id = rec.id_string();
    if node_in_db(tx, &id)? {
        tx.execute("DELETE FROM node_associations WHERE id = ?1", params![id])?;
    } else {
        tx.execute(
            "INSERT INTO node (id, kind_name) VALUES (?1, ?2)",
            params![id, rec.kind_name()],
        )?;
    }
    write_edges(tx, rec)
}

/// The save path for one node: base row and edges keyed on `node`
/// existence, kind row insert-vs-update keyed on kind-table existence.
pub fn store_node(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    store_edges(tx, rec)?;
    match rec.kind().table_name() {
        None => {
            if rec.kind() == NodeKind::Node {
                Ok(())
            } else {
                Err(StoreError::UnknownKind {
                    kind: rec.kind_name(),
                })
            }
        }
        Some(table) => {
            if row_in_table(tx, table, &rec.id_string())? {
                specific_update_row(tx, rec)
            } else {
                specific_insert_row(tx, rec)
            }
        }
    }
}

/// Populates a record's kind-specific fields from its row. Returns true iff
/// a row was found. Address-line references are taken from the scalar
/// column; the graph factory resolves them into nodes via the edge table.
pub fn load_node(tx: &Transaction<'_>, rec: &mut NodeRecord) -> Result<bool, StoreError> {
    (codec_for(rec.kind()).load)(tx, rec)
}

/// Removes a node: edges on either side, the node row, and the kind row.
pub fn remove_node(tx: &Transaction<'_>, rec: &NodeRecord) -> Result<(), StoreError> {
    (codec_for(rec.kind()).remove)(tx, rec)
}

/// Looks up the stored kind name for an identifier.
pub fn node_kind_name(tx: &Transaction<'_>, id: NodeId) -> Result<Option<String>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT kind_name FROM node WHERE id = ?1",
            params![id.to_string()],
            |row| row.get(0),
        )
        .optional()?)
}

/// All association rows owned by an identifier, in insertion order.
pub fn associations(
    tx: &Transaction<'_>,
    id: NodeId,
) -> Result<Vec<(NodeId, Direction)>, StoreError> {
    let mut stmt = tx.prepare_cached(
        "SELECT neighbor, direction FROM node_associations WHERE id = ?1 ORDER BY rowid",
    )?;
    let rows = stmt.query_map(params![id.to_string()], |row| {
        let neighbor: String = row.get(0)?;
        let direction: String = row.get(1)?;
        Ok((neighbor, direction))
    })?;
    let mut result = Vec::new();
    for row in rows {
        let (neighbor, direction) = row?;
        match NodeId::parse(&neighbor) {
            Ok(neighbor) => result.push((neighbor, Direction::parse(&direction))),
            Err(e) => {
                tracing::warn!("skipping unparsable association row for {id}: {e}");
            }
        }
    }
    Ok(result)
}
