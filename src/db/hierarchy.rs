//! Org hierarchy and event series traversal.
//!
//! Both hierarchies are stored as parent ids; walks are explicit queries.

use crate::db::manager::{DbManager, Finish};
use crate::db::session::Session;
use crate::db::sql;
use crate::error::{DbError, DbResult};
use crate::models::{Entity, Event, Fields, Key, Org};
use std::collections::HashSet;
use tracing::info;

impl DbManager {
    /// Ancestors of an org, nearest first. The org itself is not included.
    pub async fn org_ancestors(&self, org_id: i64) -> DbResult<Vec<Org>> {
        let mut session = self.session().await?;
        let result = self
            .bounded("org_ancestors", ancestors_in(&mut session, org_id))
            .await;
        self.finish(session, result, Finish::Read).await
    }

    /// Direct children of an org, by id.
    pub async fn org_children(&self, org_id: i64) -> DbResult<Vec<Org>> {
        self.find_records::<Org>(&[Org::col("parent_id").eq(org_id)])
            .await
    }

    /// Instances of a recurring series, by id.
    pub async fn series_instances(&self, series_id: i64) -> DbResult<Vec<Event>> {
        self.find_records::<Event>(&[Event::col("series_id").eq(series_id)])
            .await
    }

    /// Move an org under `parent_id`, or make it a root with `None`.
    ///
    /// Fails with [`DbError::HierarchyCycle`] when the new parent is the org
    /// itself or one of its descendants.
    pub async fn set_org_parent(&self, org_id: i64, parent_id: Option<i64>) -> DbResult<()> {
        let mut session = self.session().await?;
        let result = self
            .bounded("set_org_parent", async {
                fetch_org(&mut session, org_id).await?;
                if let Some(parent_id) = parent_id {
                    if parent_id == org_id {
                        return Err(DbError::hierarchy_cycle(Org::table(), org_id));
                    }
                    let ancestors = ancestors_in(&mut session, parent_id).await?;
                    if ancestors.iter().any(|org| org.id == org_id) {
                        return Err(DbError::hierarchy_cycle(Org::table(), org_id));
                    }
                }
                let stmt = sql::update(
                    session.db_type(),
                    Org::meta(),
                    &Fields::new().set("parent_id", parent_id),
                    &sql::key_filter(Org::meta(), &Key::from(org_id))?,
                )?;
                session.execute(&stmt).await
            })
            .await;
        self.finish(session, result, Finish::Write).await?;
        info!(org_id, parent_id = ?parent_id, "Moved org");
        Ok(())
    }
}

async fn fetch_org(session: &mut Session, org_id: i64) -> DbResult<Org> {
    let filters = sql::key_filter(Org::meta(), &Key::from(org_id))?;
    DbManager::select_in(session, Org::meta(), &filters, Some(1))
        .await?
        .pop()
        .ok_or_else(|| DbError::not_found(Org::table(), Key::from(org_id).to_string()))
        .and_then(Org::from_record)
}

async fn ancestors_in(session: &mut Session, org_id: i64) -> DbResult<Vec<Org>> {
    let mut visited = HashSet::from([org_id]);
    let mut ancestors = Vec::new();
    let mut current = fetch_org(session, org_id).await?;

    while let Some(parent_id) = current.parent_id {
        if !visited.insert(parent_id) {
            return Err(DbError::hierarchy_cycle(Org::table(), parent_id));
        }
        current = fetch_org(session, parent_id).await?;
        ancestors.push(current.clone());
    }
    Ok(ancestors)
}
