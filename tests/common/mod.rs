#![allow(dead_code)]

use async_trait::async_trait;
use etherscan_harvester::app::ports::{FetchError, HttpClientPort, HttpGetResult, SleeperPort};
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;

type Handler = dyn Fn(&str, &[(String, String)], u32) -> Result<HttpGetResult, FetchError> + Send + Sync;

#[derive(Debug, Clone)]
pub struct Call {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub timeout: Duration,
}

impl Call {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }
}

/// HTTP port answering from a closure. The closure also gets the 1-based
/// number of calls seen so far for the same url and page.
pub struct ScriptedHttp {
    handler: Box<Handler>,
    pub calls: Mutex<Vec<Call>>,
}

impl ScriptedHttp {
    pub fn new(
        handler: impl Fn(&str, &[(String, String)], u32) -> Result<HttpGetResult, FetchError> + Send + Sync + 'static,
    ) -> Self {
        Self { handler: Box::new(handler), calls: Mutex::new(Vec::new()) }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl HttpClientPort for ScriptedHttp {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        timeout: Duration,
    ) -> Result<HttpGetResult, FetchError> {
        let attempt = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call { url: url.to_string(), query: query.to_vec(), timeout });
            let page = query.iter().find(|(k, _)| k == "page").map(|(_, v)| v.clone());
            calls
                .iter()
                .filter(|c| c.url == url && c.param("page").map(str::to_string) == page)
                .count() as u32
        };
        (self.handler)(url, query, attempt)
    }
}

#[derive(Default)]
pub struct RecordingSleeper {
    pub sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl SleeperPort for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
    }
}

pub fn ok_body(body: impl Into<Vec<u8>>) -> Result<HttpGetResult, FetchError> {
    Ok(HttpGetResult { status: 200, bytes: body.into() })
}

pub fn status(code: u16) -> Result<HttpGetResult, FetchError> {
    Ok(HttpGetResult { status: code, bytes: Vec::new() })
}

/// Transaction record in the account API's shape
pub fn txn(page: u32, i: usize) -> Value {
    json!({
        "blockNumber": format!("{}", 1000 + page as usize * 10_000 + i),
        "timeStamp": "1438918233",
        "hash": format!("0xp{page}i{i}"),
        "nonce": "0",
        "blockHash": "0xblock",
        "transactionIndex": "0",
        "from": "0xfrom",
        "to": "0xto",
        "value": "1000000000000000000000",
        "gas": "90000",
        "gasPrice": "57935965411",
        "isError": "0",
        "txreceipt_status": "1",
        "input": "0x",
        "contractAddress": "",
        "cumulativeGasUsed": "21000",
        "gasUsed": "21000",
        "confirmations": "100"
    })
}

pub fn envelope(records: Vec<Value>) -> Vec<u8> {
    let (status, message) = if records.is_empty() { ("0", "No transactions found") } else { ("1", "OK") };
    serde_json::to_vec(&json!({ "status": status, "message": message, "result": records })).unwrap()
}

pub fn page_of(page: u32, n: usize) -> Vec<u8> {
    envelope((0..n).map(|i| txn(page, i)).collect())
}
