//! Launch list paging.

use rocket_graphql::{
    CachePolicy, CursorPage, CursorPageInfo, GraphqlClient, PageLimit, paginate_cursor,
};
use tracing::{debug, warn};

use crate::alert::Alert;
use crate::error::ReserverError;
use crate::operations::{LaunchConnection, LaunchList, LaunchListVariables, LaunchSummary};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    Start,
    After(String),
    End,
}

/// What one [`LaunchPager::load_more`] call produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLoad {
    /// Launches appended by this call.
    pub added: usize,
    /// Messages for the user.
    pub alerts: Vec<Alert>,
}

/// Accumulates launches page by page.
#[derive(Debug, Clone)]
pub struct LaunchPager {
    client: GraphqlClient,
    launches: Vec<LaunchSummary>,
    position: Position,
}

impl LaunchPager {
    /// A pager positioned before the first page.
    pub fn new(client: GraphqlClient) -> Self {
        Self {
            client,
            launches: Vec::new(),
            position: Position::Start,
        }
    }

    /// Launches loaded so far, in server order.
    pub fn launches(&self) -> &[LaunchSummary] {
        &self.launches
    }

    /// Whether another page can be loaded.
    pub fn has_more(&self) -> bool {
        self.position != Position::End
    }

    /// Load the next page. Once the server reports no further pages this
    /// returns an empty [`PageLoad`] without a request.
    ///
    /// On error the position is unchanged, so the call can be repeated.
    pub async fn load_more(&mut self) -> Result<PageLoad, ReserverError> {
        let cursor = match &self.position {
            Position::Start => None,
            Position::After(cursor) => Some(cursor.clone()),
            Position::End => return Ok(PageLoad::default()),
        };

        let response = self
            .client
            .fetch::<LaunchList>(LaunchListVariables { cursor }, CachePolicy::default())
            .await?;

        let mut load = PageLoad {
            alerts: Alert::for_graphql_errors(&response.errors).into_iter().collect(),
            ..PageLoad::default()
        };
        if let Some(data) = response.data {
            let connection = data.launches;
            let before = self.launches.len();
            self.launches
                .extend(connection.launches.into_iter().flatten());
            load.added = self.launches.len() - before;
            self.position = if connection.has_more {
                Position::After(connection.cursor)
            } else {
                Position::End
            };
            debug!(added = load.added, has_more = self.has_more(), "launch page loaded");
        }
        Ok(load)
    }
}

fn into_page(connection: LaunchConnection) -> CursorPage<LaunchSummary> {
    CursorPage {
        items: connection.launches.into_iter().flatten().collect(),
        page_info: CursorPageInfo {
            has_next_page: connection.has_more,
            end_cursor: Some(connection.cursor),
        },
    }
}

/// Load every launch, or the first `limit` of them.
///
/// A page that carries errors but no data ends the walk with
/// [`ReserverError::Server`].
pub async fn load_all_launches(
    client: &GraphqlClient,
    limit: Option<PageLimit>,
) -> Result<Vec<LaunchSummary>, ReserverError> {
    paginate_cursor(None, limit, |cursor| async move {
        let response = client
            .fetch::<LaunchList>(LaunchListVariables { cursor }, CachePolicy::default())
            .await?;
        let messages = response.error_messages();
        match (response.data, messages) {
            (Some(data), messages) => {
                if let Some(messages) = messages {
                    warn!(%messages, "launch page returned with errors");
                }
                Ok(into_page(data.launches))
            }
            (None, Some(messages)) => Err(ReserverError::Server { messages }),
            (None, None) => Err(ReserverError::Server {
                messages: "no launches returned".to_string(),
            }),
        }
    })
    .await
}
