use datasandbox::{
    classify, context_with_libraries, RunOptions, Sandbox, SandboxConfig, SvgRenderer, Table,
    Value,
};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Data Sandbox Simple Demo ===\n");

    // Build the worker first: cargo build --bin datasandbox-worker
    let sandbox = Sandbox::new(SandboxConfig::from_env()?)?;
    let caps = sandbox.capabilities();
    println!(
        "Engine: {} ({}), libraries: {}\n",
        caps.name,
        caps.isolation,
        caps.libraries.join(", ")
    );

    let sales = Table::new(vec![
        (
            "region".to_string(),
            vec!["east".into(), "west".into(), "east".into(), "north".into()],
        ),
        (
            "sales".to_string(),
            vec![Value::Int(10), Value::Int(7), Value::Int(5), Value::Int(3)],
        ),
    ])
    .map_err(|e| e.to_string())?;
    let context = context_with_libraries([("df".to_string(), Value::Table(sales))]);

    // Example 1: aggregation
    println!("Example 1: Group and sum");
    let code1 = r#"
result_df = df.groupby('region')['sales'].sum().reset_index()
top = result_df.sort_values('sales', ascending=False)['region'].tolist()[0]
text_summary = 'Top region: ' + top
"#;
    match sandbox.run(code1, &context, RunOptions::default()).await {
        Ok(result) => {
            let artifacts = classify(&result);
            for table in &artifacts.tables {
                println!("{}:\n{}\n", table.name, table.value.render());
            }
            for text in &artifacts.texts {
                println!("{}: {}\n", text.name, text.value);
            }
        }
        Err(e) => println!("Error: {}\n", e),
    }

    // Example 2: a chart rendered to SVG
    println!("Example 2: Bar chart");
    let code2 = r#"
totals = df.groupby('region')['sales'].sum()
fig = plt.figure(title='Sales by region')
fig.bar(totals.index, totals.tolist(), label='sales')
"#;
    match sandbox.run(code2, &context, RunOptions::default()).await {
        Ok(result) => {
            let mut artifacts = classify(&result);
            artifacts.render_figures(&SvgRenderer::default())?;
            for image in &artifacts.images {
                println!(
                    "{}: {} image, {} bytes\n",
                    image.name,
                    image.value.format,
                    image.value.data.len()
                );
            }
        }
        Err(e) => println!("Error: {}\n", e),
    }

    // Example 3: rejected before anything runs
    println!("Example 3: Disallowed syntax");
    match sandbox.run("import os", &context, RunOptions::default()).await {
        Ok(_) => println!("Unexpectedly accepted\n"),
        Err(e) => println!("Rejected: {}\n", e),
    }

    // Example 4: runaway computation hits the wall clock
    println!("Example 4: Timeout");
    let options = RunOptions::default().with_timeout(Duration::from_secs(1));
    match sandbox.run("total = sum(range(10**15))", &context, options).await {
        Ok(_) => println!("Unexpectedly finished\n"),
        Err(e) => println!("Stopped: {}\n", e.user_message(false)),
    }

    Ok(())
}
