use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressKind {
    TaskStarted,
    TaskFinished,
    DatasourceStarted,
    DatasourceFinished,
    DatasourceProgress,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceStatus {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,
    pub datasource_id: Option<String>,
    pub datasource_index: Option<usize>,
    pub datasource_total: Option<usize>,
    pub percent: Option<u8>,
    pub status: Option<DatasourceStatus>,
    pub error: Option<String>,
    pub message: String,
}

impl ProgressEvent {
    fn new(kind: ProgressKind) -> Self {
        Self {
            kind,
            datasource_id: None,
            datasource_index: None,
            datasource_total: None,
            percent: None,
            status: None,
            error: None,
            message: String::new(),
        }
    }
}

pub type ProgressCallback<'a> = &'a dyn Fn(&ProgressEvent);

/// Fans typed progress events out to a single injected callback.
pub struct ProgressEmitter<'a> {
    cb: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressEmitter<'a> {
    pub fn new(cb: Option<ProgressCallback<'a>>) -> Self {
        Self { cb }
    }

    fn emit(&self, event: ProgressEvent) {
        if let Some(cb) = self.cb {
            cb(&event);
        }
    }

    pub fn task_started(&self, total_datasources: usize) {
        let mut event = ProgressEvent::new(ProgressKind::TaskStarted);
        event.datasource_total = Some(total_datasources);
        self.emit(event);
    }

    pub fn task_finished(&self, ok: usize, failed: usize, skipped: usize) {
        let mut event = ProgressEvent::new(ProgressKind::TaskFinished);
        event.message = format!("Finished (ok={ok}, failed={failed}, skipped={skipped})");
        self.emit(event);
    }

    pub fn datasource_started(&self, datasource_id: &str, index: usize, total: usize) {
        let mut event = ProgressEvent::new(ProgressKind::DatasourceStarted);
        event.datasource_id = Some(datasource_id.to_string());
        event.datasource_index = Some(index);
        event.datasource_total = Some(total);
        event.message = format!("Starting {datasource_id}");
        self.emit(event);
    }

    pub fn datasource_progress(&self, datasource_id: &str, percent: i64, message: &str) {
        let mut event = ProgressEvent::new(ProgressKind::DatasourceProgress);
        event.datasource_id = Some(datasource_id.to_string());
        event.percent = Some(percent.clamp(0, 100) as u8);
        event.message = message.to_string();
        self.emit(event);
    }

    pub fn datasource_finished(
        &self,
        datasource_id: &str,
        index: usize,
        total: usize,
        status: DatasourceStatus,
        error: Option<&str>,
    ) {
        let mut event = ProgressEvent::new(ProgressKind::DatasourceFinished);
        event.datasource_id = Some(datasource_id.to_string());
        event.datasource_index = Some(index);
        event.datasource_total = Some(total);
        event.status = Some(status);
        event.error = error.map(str::to_string);
        event.message = match status {
            DatasourceStatus::Ok => format!("Finished {datasource_id}"),
            DatasourceStatus::Skipped => format!("skipped: {datasource_id}"),
            DatasourceStatus::Failed => format!("failed: {datasource_id}"),
        };
        self.emit(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn emitter_without_callback_is_silent() {
        let emitter = ProgressEmitter::new(None);
        emitter.task_started(3);
        emitter.task_finished(3, 0, 0);
    }

    #[test]
    fn percent_is_clamped() {
        let events = RefCell::new(Vec::new());
        let cb = |event: &ProgressEvent| events.borrow_mut().push(event.clone());
        let emitter = ProgressEmitter::new(Some(&cb));

        emitter.datasource_progress("files/a.md", -5, "");
        emitter.datasource_progress("files/a.md", 250, "");

        let events = events.borrow();
        assert_eq!(events[0].percent, Some(0));
        assert_eq!(events[1].percent, Some(100));
    }

    #[test]
    fn finished_event_carries_status_and_error() {
        let events = RefCell::new(Vec::new());
        let cb = |event: &ProgressEvent| events.borrow_mut().push(event.clone());
        let emitter = ProgressEmitter::new(Some(&cb));

        emitter.datasource_finished("files/a.md", 1, 2, DatasourceStatus::Failed, Some("boom"));

        let events = events.borrow();
        assert_eq!(events[0].status, Some(DatasourceStatus::Failed));
        assert_eq!(events[0].error.as_deref(), Some("boom"));
        assert!(events[0].message.starts_with("failed:"));
    }
}
