use cukeflow_test::reporting::schema::report_schema;

pub fn execute(_args: &[String]) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&report_schema())?);
    Ok(())
}
