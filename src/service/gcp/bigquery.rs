//! [`BqService`] over the BigQuery REST API via `gcp-bigquery-client`.

use crate::error::{FluentError, Result};
use crate::schema::{BqType, Field, FieldMode};
use crate::service::{BqService, Row, SchemaSpec, TableId};
use crate::validate::{CreateMode, SourceFormat, WriteMode};
use async_trait::async_trait;
use gcp_bigquery_client::error::BQError;
use gcp_bigquery_client::model::dataset::Dataset;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::job::Job;
use gcp_bigquery_client::model::job_configuration::JobConfiguration;
use gcp_bigquery_client::model::job_configuration_load::JobConfigurationLoad;
use gcp_bigquery_client::model::job_configuration_query::JobConfigurationQuery;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::ResultSet;
use gcp_bigquery_client::model::table::Table;
use gcp_bigquery_client::model::table_data_insert_all_request::TableDataInsertAllRequest;
use gcp_bigquery_client::model::table_field_schema::TableFieldSchema;
use gcp_bigquery_client::model::table_reference::TableReference;
use gcp_bigquery_client::model::table_schema::TableSchema;
use gcp_bigquery_client::Client;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

pub struct BigQueryBackend {
    client: Client,
    project: String,
}

impl BigQueryBackend {
    pub fn new(client: Client, project: impl Into<String>) -> Self {
        Self {
            client,
            project: project.into(),
        }
    }

    pub async fn from_service_account_key_file(
        key_file: &str,
        project: impl Into<String>,
    ) -> Result<Self> {
        let client = Client::from_service_account_key_file(key_file)
            .await
            .map_err(|e| FluentError::Credential(e.to_string()))?;
        Ok(Self::new(client, project))
    }

    async fn insert_and_wait(&self, job: Job) -> Result<Job> {
        let inserted = self
            .client
            .job()
            .insert(&self.project, job)
            .await
            .map_err(service_err)?;
        let job_ref = inserted
            .job_reference
            .clone()
            .ok_or_else(|| FluentError::Service("job inserted without a reference".to_string()))?;
        let job_id = job_ref
            .job_id
            .ok_or_else(|| FluentError::Service("job inserted without an id".to_string()))?;

        loop {
            let job = self
                .client
                .job()
                .get_job(&self.project, &job_id, job_ref.location.as_deref())
                .await
                .map_err(service_err)?;
            let state = job.status.as_ref().and_then(|s| s.state.as_deref());
            if state == Some("DONE") {
                if let Some(err) = job.status.as_ref().and_then(|s| s.error_result.as_ref()) {
                    return Err(FluentError::Service(format!("job {job_id} failed: {err:?}")));
                }
                return Ok(job);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl BqService for BigQueryBackend {
    async fn query_rows(&self, sql: &str) -> Result<Vec<Row>> {
        let response = self
            .client
            .job()
            .query(&self.project, QueryRequest::new(sql))
            .await
            .map_err(service_err)?;
        let mut result_set = ResultSet::new_from_query_response(response);

        let names = result_set.column_names();
        let mut rows = Vec::with_capacity(result_set.row_count());
        while result_set.next_row() {
            let mut row = Row::new();
            for name in &names {
                if let Some(value) = result_set
                    .get_json_value_by_name(name)
                    .map_err(service_err)?
                {
                    row.insert(name.clone(), value);
                }
            }
            rows.push(row);
        }
        Ok(rows)
    }

    async fn query_to_table(
        &self,
        sql: &str,
        dest: &TableId,
        write: WriteMode,
        create: CreateMode,
    ) -> Result<u64> {
        let job = Job {
            configuration: Some(JobConfiguration {
                query: Some(JobConfigurationQuery {
                    query: sql.to_string(),
                    destination_table: Some(table_reference(dest)),
                    write_disposition: Some(write.as_str().to_string()),
                    create_disposition: Some(create.as_str().to_string()),
                    use_legacy_sql: Some(false),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        };
        let done = self.insert_and_wait(job).await?;
        let job_id = done
            .job_reference
            .and_then(|r| r.job_id)
            .ok_or_else(|| FluentError::Service("completed job lost its id".to_string()))?;

        let results = self
            .client
            .job()
            .get_query_results(&self.project, &job_id, GetQueryResultsParameters::default())
            .await
            .map_err(service_err)?;
        Ok(results
            .total_rows
            .and_then(|n| n.parse().ok())
            .unwrap_or(0))
    }

    async fn load_from_uri(
        &self,
        uri: &str,
        dest: &TableId,
        schema: &SchemaSpec,
        format: SourceFormat,
        write: WriteMode,
        create: CreateMode,
        _location: &str,
    ) -> Result<()> {
        let load = JobConfigurationLoad {
            source_uris: Some(vec![uri.to_string()]),
            destination_table: Some(table_reference(dest)),
            source_format: Some(format.as_str().to_string()),
            write_disposition: Some(write.as_str().to_string()),
            create_disposition: Some(create.as_str().to_string()),
            autodetect: Some(schema.is_autodetect()),
            schema: match schema {
                SchemaSpec::Explicit(fields) => Some(table_schema(fields)),
                SchemaSpec::Autodetect => None,
            },
            ..Default::default()
        };
        let job = Job {
            configuration: Some(JobConfiguration {
                load: Some(load),
                ..Default::default()
            }),
            ..Default::default()
        };
        self.insert_and_wait(job).await?;
        Ok(())
    }

    async fn load_from_json(
        &self,
        rows: &[Row],
        dest: &TableId,
        schema: &SchemaSpec,
        _format: SourceFormat,
        _location: &str,
    ) -> Result<()> {
        // Inline records go through the streaming API, which has no
        // autodetect and needs the table to exist up front.
        let fields = match schema {
            SchemaSpec::Explicit(fields) => fields,
            SchemaSpec::Autodetect => {
                return Err(FluentError::Service(
                    "inline record loads require an explicit schema with the BigQuery backend"
                        .to_string(),
                ));
            }
        };

        let table = Table::new(
            &dest.project,
            &dest.dataset,
            &dest.table,
            table_schema(fields),
        );
        match self.client.table().create(table).await {
            Ok(_) => {}
            Err(e) if is_conflict(&e) => {}
            Err(e) => return Err(service_err(e)),
        }

        let mut request = TableDataInsertAllRequest::new();
        for row in rows {
            request.add_row(None, row).map_err(service_err)?;
        }
        self.client
            .tabledata()
            .insert_all(&dest.project, &dest.dataset, &dest.table, request)
            .await
            .map_err(service_err)?;
        Ok(())
    }

    async fn table_num_rows(&self, dest: &TableId) -> Result<u64> {
        let table = self
            .client
            .table()
            .get(&dest.project, &dest.dataset, &dest.table, None)
            .await
            .map_err(|e| {
                if is_not_found(&e) {
                    FluentError::NotFound(format!("table {dest} not found"))
                } else {
                    service_err(e)
                }
            })?;
        Ok(table.num_rows.and_then(|n| n.parse().ok()).unwrap_or(0))
    }

    async fn delete_table(&self, dest: &TableId, not_found_ok: bool) -> Result<()> {
        match self
            .client
            .table()
            .delete(&dest.project, &dest.dataset, &dest.table)
            .await
        {
            Ok(()) => Ok(()),
            Err(e) if not_found_ok && is_not_found(&e) => Ok(()),
            Err(e) if is_not_found(&e) => {
                Err(FluentError::NotFound(format!("table {dest} not found")))
            }
            Err(e) => Err(service_err(e)),
        }
    }

    async fn create_dataset(
        &self,
        project: &str,
        dataset: &str,
        location: &str,
        timeout_secs: u64,
    ) -> Result<()> {
        let dataset = Dataset::new(project, dataset).location(location);
        let create = self.client.dataset().create(dataset);
        tokio::time::timeout(Duration::from_secs(timeout_secs), create)
            .await
            .map_err(|_| {
                FluentError::Service(format!(
                    "dataset creation timed out after {timeout_secs}s"
                ))
            })?
            .map_err(service_err)?;
        Ok(())
    }

    async fn delete_dataset(&self, project: &str, dataset: &str) -> Result<()> {
        match self.client.dataset().delete(project, dataset, true).await {
            Ok(()) => Ok(()),
            Err(e) if is_not_found(&e) => Ok(()),
            Err(e) => Err(service_err(e)),
        }
    }
}

fn table_reference(dest: &TableId) -> TableReference {
    TableReference::new(&dest.project, &dest.dataset, &dest.table)
}

fn table_schema(fields: &[Field]) -> TableSchema {
    TableSchema::new(fields.iter().map(field_schema).collect())
}

fn field_schema(field: &Field) -> TableFieldSchema {
    let mut schema = match field.field_type {
        BqType::String => TableFieldSchema::string(&field.name),
        BqType::Bytes => TableFieldSchema::bytes(&field.name),
        BqType::Integer => TableFieldSchema::integer(&field.name),
        BqType::Float => TableFieldSchema::float(&field.name),
        BqType::Numeric => TableFieldSchema::numeric(&field.name),
        BqType::Bignumeric => TableFieldSchema::big_numeric(&field.name),
        BqType::Boolean => TableFieldSchema::bool(&field.name),
        BqType::Timestamp => TableFieldSchema::timestamp(&field.name),
        BqType::Date => TableFieldSchema::date(&field.name),
        BqType::Time => TableFieldSchema::time(&field.name),
        BqType::Datetime => TableFieldSchema::date_time(&field.name),
        BqType::Geography => TableFieldSchema::geography(&field.name),
        BqType::Json => TableFieldSchema::json(&field.name),
        BqType::Record => TableFieldSchema::record(&field.name, vec![]),
    };
    schema.mode = Some(
        match field.mode {
            FieldMode::Nullable => "NULLABLE",
            FieldMode::Required => "REQUIRED",
            FieldMode::Repeated => "REPEATED",
        }
        .to_string(),
    );
    schema.description = field.description.clone();
    schema
}

fn service_err(err: BQError) -> FluentError {
    FluentError::Service(err.to_string())
}

fn is_not_found(err: &BQError) -> bool {
    matches!(err, BQError::ResponseError { error } if error.error.code == 404)
}

fn is_conflict(err: &BQError) -> bool {
    matches!(err, BQError::ResponseError { error } if error.error.code == 409)
}
