//! End-to-end runs through the real worker binary.

use datasandbox::{
    analyze, classify, context_with_libraries, NodeKind, ResourceLimits, ResultCache, RunOptions,
    Sandbox, SandboxConfig, SandboxError, Table, Value,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn sandbox() -> Sandbox {
    let config = SandboxConfig::default().with_worker_path(env!("CARGO_BIN_EXE_datasandbox-worker"));
    Sandbox::new(config).expect("worker binary should be built for integration tests")
}

fn sales_context() -> BTreeMap<String, Value> {
    let df = Table::new(vec![
        (
            "region".to_string(),
            vec![
                "east".into(),
                "west".into(),
                "east".into(),
                "north".into(),
                "west".into(),
            ],
        ),
        (
            "sales".to_string(),
            vec![
                Value::Int(10),
                Value::Int(7),
                Value::Int(5),
                Value::Int(3),
                Value::Int(1),
            ],
        ),
    ])
    .unwrap();
    context_with_libraries([("df".to_string(), Value::Table(df))])
}

#[tokio::test]
async fn test_import_is_rejected() {
    let err = sandbox()
        .run("import os", &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SandboxError::DisallowedSyntax {
            kind: NodeKind::Import,
            line: 1
        }
    ));
}

#[tokio::test]
async fn test_exec_is_not_defined() {
    let code = "exec('print(1)')";
    assert!(analyze(code).is_ok());

    let err = sandbox()
        .run(code, &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap_err();
    let SandboxError::Runtime(failure) = err else {
        panic!("expected runtime failure, got {:?}", err);
    };
    assert_eq!(failure.kind, "NameError");
    assert!(failure.message.contains("exec"));
}

#[tokio::test]
async fn test_bindings_and_stdout() {
    let options = RunOptions::default().with_timeout(Duration::from_secs(2));
    let result = sandbox()
        .run("x=1\nprint('ok')", &BTreeMap::new(), options)
        .await
        .unwrap();
    assert_eq!(result.get("x"), Some(&Value::Int(1)));
    assert_eq!(result.stdout, "ok\n");
    assert_eq!(result.returned, None);
}

#[tokio::test]
async fn test_while_is_rejected_before_running() {
    let err = sandbox()
        .run("while True:\n    pass", &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SandboxError::DisallowedSyntax {
            kind: NodeKind::While,
            ..
        }
    ));
}

#[tokio::test]
async fn test_runaway_computation_times_out() {
    let options = RunOptions::default().with_timeout(Duration::from_secs(1));
    let started = Instant::now();
    let err = sandbox()
        .run("total = sum(range(10**15))", &BTreeMap::new(), options)
        .await
        .unwrap_err();
    assert!(matches!(err, SandboxError::Timeout), "got {:?}", err);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_groupby_result_is_a_table() {
    let code = "result_df = df.groupby('region')['sales'].sum().reset_index()";
    let result = sandbox()
        .run(code, &sales_context(), RunOptions::default())
        .await
        .unwrap();

    let artifacts = classify(&result);
    assert_eq!(artifacts.tables.len(), 1);
    let table = &artifacts.tables[0];
    assert_eq!(table.name, "result_df");
    assert_eq!(table.value.num_rows(), 3);
    assert_eq!(table.value.column_names(), vec!["region", "sales"]);
}

#[tokio::test]
async fn test_attribute_escape_fails() {
    let sandbox = sandbox();
    for code in ["c = df.__class__", "d = df.__dict__", "k = (1).__class__"] {
        let err = sandbox
            .run(code, &sales_context(), RunOptions::default())
            .await
            .unwrap_err();
        let SandboxError::Runtime(failure) = err else {
            panic!("{}: expected runtime failure, got {:?}", code, err);
        };
        assert_eq!(failure.kind, "AttributeError", "{}", code);
    }
}

#[tokio::test]
async fn test_huge_allocation_is_a_failure() {
    let err = sandbox()
        .run("xs = [0] * 10**9", &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, SandboxError::MemoryLimitExceeded),
        "got {:?}",
        err
    );
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_address_space_ceiling_aborts_worker() {
    // Under the evaluator's budget, which is half the address space, but the
    // copies made while building and reporting the string are not.
    let code = "x = '{:>90000000}'.format(1)";
    let err = sandbox()
        .run(code, &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap_err();
    assert!(
        matches!(err, SandboxError::MemoryLimitExceeded),
        "got {:?}",
        err
    );
}

#[tokio::test]
async fn test_context_is_not_modified() {
    let context = sales_context();
    let code = "df['double'] = df['sales'] * 2\nn = len(df.columns)";
    let result = sandbox()
        .run(code, &context, RunOptions::default())
        .await
        .unwrap();
    assert_eq!(result.get("n"), Some(&Value::Int(3)));

    let Some(Value::Table(original)) = context.get("df") else {
        panic!("context lost df");
    };
    assert_eq!(original.columns.len(), 2);
}

#[tokio::test]
async fn test_text_and_figure_artifacts() {
    let code = "\
totals = df.groupby('region')['sales'].sum()
fig = plt.figure(title='Sales')
fig.bar(totals.index, totals.tolist())
text_note = 'regions: ' + str(len(totals))
";
    let result = sandbox()
        .run(code, &sales_context(), RunOptions::default())
        .await
        .unwrap();
    let artifacts = classify(&result);
    assert_eq!(artifacts.figures.len(), 1);
    assert_eq!(artifacts.texts[0].value, "regions: 3");
    // The grouped Series is promoted to a table named by its binding.
    assert_eq!(artifacts.tables[0].name, "totals");
}

#[tokio::test]
async fn test_concurrent_runs_are_independent() {
    let sandbox = Arc::new(sandbox());
    let a = {
        let sandbox = sandbox.clone();
        tokio::spawn(async move {
            sandbox
                .run("v = 1", &BTreeMap::new(), RunOptions::default())
                .await
        })
    };
    let b = {
        let sandbox = sandbox.clone();
        tokio::spawn(async move {
            sandbox
                .run("v = 2", &BTreeMap::new(), RunOptions::default())
                .await
        })
    };
    let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
    assert_eq!(a.get("v"), Some(&Value::Int(1)));
    assert_eq!(b.get("v"), Some(&Value::Int(2)));
}

#[tokio::test]
async fn test_cached_result_is_replayed() {
    let cache = Arc::new(ResultCache::new(8));
    let sandbox = sandbox().with_cache(cache.clone());
    let first = sandbox
        .run("y = 6 * 7", &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(cache.len(), 1);
    let second = sandbox
        .run("y = 6 * 7", &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap();
    assert_eq!(first, second);

    // Failures are not cached.
    let _ = sandbox
        .run("z = 1 / 0", &BTreeMap::new(), RunOptions::default())
        .await
        .unwrap_err();
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_missing_worker_is_reported() {
    let config = SandboxConfig::default()
        .with_limits(ResourceLimits::default())
        .with_worker_path("/nonexistent/datasandbox-worker");
    assert!(matches!(
        Sandbox::new(config),
        Err(SandboxError::WorkerNotFound)
    ));
}
