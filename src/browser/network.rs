//! 网络活动跟踪，用于判断"网络空闲"

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::error::{AppError, AppResult};

/// 进行中的请求集合与最近一次变化时间
#[derive(Debug)]
pub struct ActivityState {
    in_flight: HashSet<String>,
    last_change: Instant,
}

impl ActivityState {
    pub fn new(now: Instant) -> Self {
        Self {
            in_flight: HashSet::new(),
            last_change: now,
        }
    }

    pub fn started(&mut self, request_id: String, now: Instant) {
        self.in_flight.insert(request_id);
        self.last_change = now;
    }

    pub fn finished(&mut self, request_id: &str, now: Instant) {
        if self.in_flight.remove(request_id) {
            self.last_change = now;
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// 已经空闲了多久，有请求进行中时返回 `None`
    pub fn idle_for(&self, now: Instant) -> Option<Duration> {
        self.in_flight
            .is_empty()
            .then(|| now.saturating_duration_since(self.last_change))
    }
}

enum Activity {
    Started(String),
    Finished(String),
}

/// 页面的网络活动跟踪器
pub struct NetworkTracker {
    state: Arc<Mutex<ActivityState>>,
    task: JoinHandle<()>,
}

impl NetworkTracker {
    /// 订阅页面的网络事件
    pub async fn attach(page: &Page) -> AppResult<Self> {
        let started = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(|e| AppError::session_failed("network.requestWillBeSent", e))?
            .map(|e| Activity::Started(e.request_id.inner().clone()));
        let finished = page
            .event_listener::<EventLoadingFinished>()
            .await
            .map_err(|e| AppError::session_failed("network.loadingFinished", e))?
            .map(|e| Activity::Finished(e.request_id.inner().clone()));
        let failed = page
            .event_listener::<EventLoadingFailed>()
            .await
            .map_err(|e| AppError::session_failed("network.loadingFailed", e))?
            .map(|e| Activity::Finished(e.request_id.inner().clone()));

        let state = Arc::new(Mutex::new(ActivityState::new(Instant::now())));
        let task_state = Arc::clone(&state);
        let mut events = Box::pin(futures::stream::select(
            started,
            futures::stream::select(finished, failed),
        ));

        let task = tokio::spawn(async move {
            while let Some(activity) = events.next().await {
                let Ok(mut state) = task_state.lock() else {
                    break;
                };
                match activity {
                    Activity::Started(id) => state.started(id, Instant::now()),
                    Activity::Finished(id) => state.finished(&id, Instant::now()),
                }
            }
        });

        Ok(Self { state, task })
    }

    /// 等待没有进行中的请求并保持 `quiet_window`，没有内置超时
    pub async fn wait_for_idle(&self, quiet_window: Duration) {
        let poll = (quiet_window / 4).clamp(Duration::from_millis(10), Duration::from_millis(100));
        loop {
            let idle_for = self
                .state
                .lock()
                .map(|state| state.idle_for(Instant::now()))
                .unwrap_or(None);
            if matches!(idle_for, Some(d) if d >= quiet_window) {
                return;
            }
            sleep(poll).await;
        }
    }
}

impl Drop for NetworkTracker {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_only_when_nothing_in_flight() {
        let t0 = Instant::now();
        let mut state = ActivityState::new(t0);

        state.started("1".to_string(), t0);
        state.started("2".to_string(), t0);
        assert_eq!(state.idle_for(t0 + Duration::from_secs(1)), None);

        state.finished("1", t0 + Duration::from_millis(100));
        assert_eq!(state.in_flight(), 1);
        assert_eq!(state.idle_for(t0 + Duration::from_secs(1)), None);

        state.finished("2", t0 + Duration::from_millis(200));
        assert_eq!(
            state.idle_for(t0 + Duration::from_millis(700)),
            Some(Duration::from_millis(500))
        );
    }

    #[test]
    fn test_unknown_finish_does_not_reset_quiet_window() {
        let t0 = Instant::now();
        let mut state = ActivityState::new(t0);

        state.finished("never-started", t0 + Duration::from_millis(300));
        assert_eq!(
            state.idle_for(t0 + Duration::from_millis(400)),
            Some(Duration::from_millis(400))
        );
    }
}
