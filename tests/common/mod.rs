#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pg_gateway::{ConnectionSource, GatewayError, ResultSet, RowValues, Session};

/// Shared, ordered log of everything the mock connections see.
#[derive(Clone, Default)]
pub struct Recorder {
    events: Arc<Mutex<Vec<(usize, String)>>>,
}

impl Recorder {
    fn push(&self, conn: usize, event: impl Into<String>) {
        self.events.lock().unwrap().push((conn, event.into()));
    }

    /// Event text in order, without connection ids.
    pub fn events(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn events_for(&self, conn: usize) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(id, _)| *id == conn)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn count(&self, event: &str) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

/// Connection source whose sessions record every statement and fail on request.
#[derive(Default)]
pub struct MockSource {
    pub recorder: Recorder,
    fail_on: Arc<Vec<String>>,
    fail_acquire: AtomicBool,
    next_id: AtomicUsize,
}

impl MockSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statements containing any of `needles` fail with `ExecutionError`.
    pub fn failing_on(needles: &[&str]) -> Self {
        Self {
            fail_on: Arc::new(needles.iter().map(|s| (*s).to_string()).collect()),
            ..Self::default()
        }
    }

    pub fn fail_acquire(&self) {
        self.fail_acquire.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConnectionSource for MockSource {
    type Conn = MockConn;

    async fn acquire(&self) -> Result<MockConn, GatewayError> {
        if self.fail_acquire.load(Ordering::SeqCst) {
            return Err(GatewayError::ExecutionError("pool exhausted".into()));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.recorder.push(id, "acquire");
        Ok(MockConn {
            id,
            recorder: self.recorder.clone(),
            fail_on: Arc::clone(&self.fail_on),
        })
    }
}

pub struct MockConn {
    id: usize,
    recorder: Recorder,
    fail_on: Arc<Vec<String>>,
}

impl MockConn {
    fn check(&self, sql: &str) -> Result<(), GatewayError> {
        if self.fail_on.iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(GatewayError::ExecutionError(format!("mock failure: {sql}")));
        }
        Ok(())
    }
}

impl Drop for MockConn {
    fn drop(&mut self) {
        self.recorder.push(self.id, "release");
    }
}

#[async_trait]
impl Session for MockConn {
    async fn batch_execute(&mut self, sql: &str) -> Result<(), GatewayError> {
        self.recorder.push(self.id, sql);
        self.check(sql)
    }

    async fn query(
        &mut self,
        sql: &str,
        params: &[RowValues],
    ) -> Result<ResultSet, GatewayError> {
        self.recorder.push(self.id, format!("query: {sql}"));
        self.check(sql)?;

        let mut rs = ResultSet::with_capacity(1);
        rs.set_column_names(Arc::new(vec!["sql".to_string(), "params".to_string()]));
        rs.add_row_values(vec![
            RowValues::Text(sql.to_string()),
            RowValues::Int(i64::try_from(params.len()).unwrap()),
        ]);
        Ok(rs)
    }
}

/// The SQL text a mock query saw, read back from its result.
pub fn executed_sql(rs: &ResultSet) -> String {
    rs.first()
        .and_then(|row| row.get("sql"))
        .and_then(RowValues::as_text)
        .unwrap()
        .to_string()
}
