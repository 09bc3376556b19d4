//! Query & ResultSummary
//!
//! 쿼리 정의와 결과 요약

use std::collections::HashMap;
use std::time::Duration;

use crate::bolt::message::SuccessMessage;
use crate::bolt::packstream::PackStreamValue;

use super::types::Value;

// ============================================================================
// Query - 쿼리
// ============================================================================

/// 쿼리
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// 쿼리 텍스트
    pub text: String,
    /// 파라미터
    pub parameters: HashMap<String, Value>,
}

impl Query {
    /// 새 쿼리 생성
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
        }
    }

    /// 파라미터 추가
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// 파라미터들 추가
    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

// ============================================================================
// QueryType - 쿼리 타입
// ============================================================================

/// 쿼리 타입
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryType {
    /// 읽기 전용
    #[default]
    ReadOnly,
    /// 읽기/쓰기
    ReadWrite,
    /// 쓰기 전용
    WriteOnly,
    /// 스키마 변경
    SchemaWrite,
}

impl QueryType {
    /// 서버 표기 (`r`, `rw`, `w`, `s`)에서 변환
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "r" => Some(Self::ReadOnly),
            "rw" => Some(Self::ReadWrite),
            "w" => Some(Self::WriteOnly),
            "s" => Some(Self::SchemaWrite),
            _ => None,
        }
    }
}

// ============================================================================
// Counters - 변경 카운터
// ============================================================================

/// 카운터
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    /// 생성된 노드 수
    pub nodes_created: i64,
    /// 삭제된 노드 수
    pub nodes_deleted: i64,
    /// 생성된 관계 수
    pub relationships_created: i64,
    /// 삭제된 관계 수
    pub relationships_deleted: i64,
    /// 설정된 속성 수
    pub properties_set: i64,
    /// 추가된 레이블 수
    pub labels_added: i64,
    /// 제거된 레이블 수
    pub labels_removed: i64,
    /// 생성된 인덱스 수
    pub indexes_added: i64,
    /// 제거된 인덱스 수
    pub indexes_removed: i64,
    /// 추가된 제약조건 수
    pub constraints_added: i64,
    /// 제거된 제약조건 수
    pub constraints_removed: i64,
}

impl Counters {
    /// `stats` 메타데이터에서 생성
    pub fn from_stats(stats: &HashMap<String, PackStreamValue>) -> Self {
        let get = |key: &str| stats.get(key).and_then(|v| v.as_int()).unwrap_or(0);
        Self {
            nodes_created: get("nodes-created"),
            nodes_deleted: get("nodes-deleted"),
            relationships_created: get("relationships-created"),
            relationships_deleted: get("relationships-deleted"),
            properties_set: get("properties-set"),
            labels_added: get("labels-added"),
            labels_removed: get("labels-removed"),
            indexes_added: get("indexes-added"),
            indexes_removed: get("indexes-removed"),
            constraints_added: get("constraints-added"),
            constraints_removed: get("constraints-removed"),
        }
    }

    /// 변경 사항 존재 여부
    pub fn contains_updates(&self) -> bool {
        self.nodes_created > 0
            || self.nodes_deleted > 0
            || self.relationships_created > 0
            || self.relationships_deleted > 0
            || self.properties_set > 0
            || self.labels_added > 0
            || self.labels_removed > 0
    }

    /// 스키마 변경 존재 여부
    pub fn contains_system_updates(&self) -> bool {
        self.indexes_added > 0
            || self.indexes_removed > 0
            || self.constraints_added > 0
            || self.constraints_removed > 0
    }
}

// ============================================================================
// ResultSummary - 결과 요약
// ============================================================================

/// 결과 요약
///
/// 마지막 SUCCESS를 받은 뒤에만 만들어집니다. 레코드를 읽지 않고 버린 경우에도 동일합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    /// 실행한 쿼리
    pub query: Query,
    /// 쿼리 타입
    pub query_type: QueryType,
    /// 카운터
    pub counters: Counters,
    /// 첫 레코드까지 걸린 시간
    pub result_available_after: Option<Duration>,
    /// 마지막 레코드까지 걸린 시간
    pub result_consumed_after: Option<Duration>,
    /// 데이터베이스
    pub database: Option<String>,
    /// 북마크 (auto-commit만)
    pub bookmark: Option<String>,
}

impl ResultSummary {
    /// RUN 응답과 마지막 PULL/DISCARD 응답으로 요약 생성
    pub(crate) fn from_metadata(query: Query, run: &SuccessMessage, tail: &SuccessMessage) -> Self {
        let millis = |v: Option<i64>| v.map(|ms| Duration::from_millis(ms.max(0) as u64));
        Self {
            query,
            query_type: tail
                .query_type()
                .and_then(QueryType::from_code)
                .unwrap_or_default(),
            counters: tail.stats().map(Counters::from_stats).unwrap_or_default(),
            result_available_after: millis(run.t_first()),
            result_consumed_after: millis(tail.t_last()),
            database: tail.db().or_else(|| run.db()).map(String::from),
            bookmark: tail.bookmark().map(String::from),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
