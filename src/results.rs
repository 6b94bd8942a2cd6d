/*!
Control the appearance of simulation result data

# Working with [`ResultsBuilder`]

## Examples

Creating a [`ResultsTable`] after running a simulation group:

```no_run
use uncle_sim::prelude::*;

let group = SimulationBuilder::new()
    .selfish_power_iter([250, 350])
    .repeat_all(5)
    .target_length(500)
    .build()
    .unwrap();

let results = group
    .run_all()
    .unwrap()
    .average(Average::Median) // Take the median of repeated runs' results
    .shares()                 // Include each pool's revenue share
    .mining_power_func(Producer::Selfish, "Ideal SM Revenue", selfish_revenue(0.0))
    .format(Format::CSV)      // Output results as CSV
    .build();

println!("{}", results);
```

# Aggregating Results
Columns which vary between repeated runs (chain length, rewards, shares and
block counts) are reduced with the chosen [`Average`]. Every other column
takes the value of the first run of each group.
*/

use std::{
    collections::BTreeSet,
    fmt::{Display, Formatter},
    num::NonZeroUsize,
};

use crate::{
    blockchain::Chain,
    block::Producer,
    power_dist::PowerValue,
    simulation::SimulationOutput,
    utils::{median_of_floats, NamedFn},
};

/// Floating point precision of results data.
pub const FLOAT_PRECISION_DIGITS: usize = 6;

/// Builder for [`ResultsTable`]. Typically produced by running a
/// [`SimulationGroup`](crate::simulation::SimulationGroup).
#[derive(Debug, Clone)]
pub struct ResultsBuilder {
    average: Average,
    columns: BTreeSet<Column>,
    data: Vec<SimulationOutput>,
    format: Format,
    repeated: NonZeroUsize,
}

/// Describes the appearance of a [`ResultsTable`] as given by its
/// [`Display`] implementation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    /// Comma-separated, without extra whitespace.
    CSV,
    /// Human-readable.
    #[default]
    PrettyPrint,
}

/// Reward categories tracked per pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RewardCategory {
    Mined,
    Nephew,
    Uncle,
}

impl ResultsBuilder {
    pub(crate) fn new(
        data: Vec<SimulationOutput>,
        repeated: NonZeroUsize,
    ) -> Self {
        Self {
            data,
            repeated,
            average: Average::default(),
            columns: BTreeSet::default(),
            format: Format::default(),
        }
    }

    /// Include every built-in column: run id, strategy names, chain length,
    /// blocks published, blocks dropped, reward totals, per-category rewards
    /// and revenue shares.
    ///
    /// [`ResultsBuilder::average`] must still be called separately
    /// to create averaged data.
    pub fn all(self) -> Self {
        self.run_id()
            .strategy_names()
            .chain_length()
            .blocks_published()
            .dropped()
            .totals()
            .categories()
            .shares()
    }

    /// Average the results of repeated runs based on the given [`Average`]
    /// type. For types other than [`Average::None`], a column describing the
    /// averaging method will be included in the results table.
    pub fn average(mut self, average: Average) -> Self {
        self.average = average;

        self
    }

    /// Include the "Run" column.
    pub fn run_id(mut self) -> Self {
        self.columns.insert(Column::RunId);

        self
    }

    /// Include the "Blocks Published" column: blocks delivered by both pools.
    pub fn blocks_published(mut self) -> Self {
        self.columns.insert(Column::BlocksPublished);

        self
    }

    /// Include the "Blocks Dropped" column.
    pub fn dropped(mut self) -> Self {
        self.columns.insert(Column::Dropped);

        self
    }

    /// Include the "Chain Length" column.
    pub fn chain_length(mut self) -> Self {
        self.columns.insert(Column::ChainLength);

        self
    }

    /// Include the "Total Reward" column and a total reward column for each
    /// pool.
    pub fn totals(mut self) -> Self {
        self.columns.insert(Column::TotalReward);
        for producer in PRODUCERS {
            self.columns.insert(Column::PoolReward(producer));
        }

        self
    }

    /// Include the mined, nephew and uncle reward of each pool.
    pub fn categories(mut self) -> Self {
        for producer in PRODUCERS {
            for category in CATEGORIES {
                self.columns.insert(Column::Category(producer, category));
            }
        }

        self
    }

    /// Include the revenue share of each pool.
    pub fn shares(mut self) -> Self {
        for producer in PRODUCERS {
            self.columns.insert(Column::Share(producer));
        }

        self
    }

    /// Include the strategy name of each pool.
    pub fn strategy_names(mut self) -> Self {
        for producer in PRODUCERS {
            self.columns.insert(Column::Strategy(producer));
        }

        self
    }

    /// Include a column with title `title` which only contains the given
    /// value.
    pub fn constant<T>(mut self, title: T, value: f64) -> Self
    where
        T: Into<String>,
    {
        self.columns
            .insert(Column::Constant(NamedFn::new(title, move |_| value)));

        self
    }

    /// Use the fraction of hash power held by `producer` as input to `func`,
    /// and present the output in a table column with the given title.
    pub fn mining_power_func<T, F>(
        mut self,
        producer: Producer,
        title: T,
        func: F,
    ) -> Self
    where
        T: Into<String>,
        F: Fn(f64) -> f64 + Send + Sync + 'static,
    {
        self.columns.insert(Column::PowerFunction(
            producer,
            NamedFn::new(title, func),
        ));

        self
    }

    /// Specify the [`Format`] of the results table.
    pub fn format(mut self, format: Format) -> Self {
        self.format = format;

        self
    }

    /// Extract the raw [`SimulationOutput`] data from this [`ResultsBuilder`].
    ///
    /// # Ordering
    /// Runs are ordered by power split in the order the splits were given to
    /// [`SimulationBuilder`](crate::simulation::SimulationBuilder), with
    /// repeated runs grouped together.
    pub fn data(self) -> Vec<SimulationOutput> {
        self.data
    }

    /// Create new [`ResultsTable`].
    pub fn build(self) -> ResultsTable {
        let ResultsBuilder { average, mut columns, data, format, repeated } =
            self;

        for producer in PRODUCERS {
            columns.insert(Column::Power(producer));
        }
        if average != Average::None {
            columns.insert(Column::AverageOf(average));
        }

        let columns = Vec::from_iter(columns);
        let rows = match average {
            Average::None => data
                .iter()
                .map(|output| {
                    columns.iter().map(|col| col.value(output)).collect()
                })
                .collect(),
            _ => data
                .chunks(repeated.get())
                .map(|outputs| {
                    columns
                        .iter()
                        .map(|col| col.average_value(average, outputs))
                        .collect()
                })
                .collect(),
        };

        ResultsTable { columns, format, rows }
    }
}

/// Formatted results from the completion of a
/// [`SimulationGroup`](crate::simulation::SimulationGroup). The results table
/// is given by the struct's [`Display`] implementation, as specified by
/// its [`Format`].
#[derive(Debug, Clone)]
pub struct ResultsTable {
    columns: Vec<Column>,
    format: Format,
    rows: Vec<Vec<ColumnValue>>,
}

impl ResultsTable {
    const SEPARATOR_VERTICAL: char = '|';
    const SEPARATOR_HORIZONTAL: char = '-';

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn set_format(&mut self, format: Format) {
        self.format = format;
    }

    /// Column titles, in display order.
    pub fn titles(&self) -> Vec<String> {
        self.columns.iter().map(|col| col.to_string()).collect()
    }

    /// Number of data rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    fn write_cells(
        f: &mut Formatter<'_>,
        cells: &[String],
        widths: &[usize],
    ) -> std::fmt::Result {
        for (cell, &width) in cells.iter().zip(widths) {
            write!(f, " {:width$} {}", cell, Self::SEPARATOR_VERTICAL)?;
        }

        Ok(())
    }
}

impl Display for ResultsTable {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let titles = self.titles();

        match self.format {
            Format::CSV => {
                write!(f, "{}", titles.join(","))?;

                for row in self.rows.iter() {
                    let row: Vec<_> =
                        row.iter().map(|val| val.to_string()).collect();

                    write!(f, "\n{}", row.join(","))?;
                }
            }
            Format::PrettyPrint => {
                let mut widths: Vec<_> =
                    titles.iter().map(|title| title.len()).collect();
                for row in self.rows.iter() {
                    for (i, val) in row.iter().enumerate() {
                        widths[i] = widths[i].max(val.to_string().len());
                    }
                }

                Self::write_cells(f, &titles, &widths)?;
                writeln!(f)?;

                let total_width: usize = widths.iter().map(|x| x + 3).sum();
                let rule = Self::SEPARATOR_HORIZONTAL.to_string();
                write!(f, "{}", rule.repeat(total_width))?;

                for row in self.rows.iter() {
                    writeln!(f)?;
                    let cells: Vec<_> =
                        row.iter().map(|val| val.to_string()).collect();
                    Self::write_cells(f, &cells, &widths)?;
                }
            }
        }

        Ok(())
    }
}

/// Methods of extracting an average/central value from a set of repeated
/// runs.
///
/// In the process of creating a results table, the given averaging method is
/// only applied to the values of columns which change between runs.
#[derive(Default, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Average {
    #[default]
    /// Include all repeated values.
    None,
    /// Arithmetic mean of all values.
    Mean,
    /// Median of all values.
    Median,
    /// Maximum of all values.
    Max,
    /// Minimum of all values.
    Min,
}

impl Average {
    fn apply(&self, values: Vec<f64>) -> f64 {
        let n = values.len() as f64;
        match self {
            Average::Mean => values.into_iter().sum::<f64>() / n,
            Average::Median => median_of_floats(values),
            Average::Max => values.into_iter().fold(f64::NEG_INFINITY, f64::max),
            Average::Min => values.into_iter().fold(f64::INFINITY, f64::min),
            Average::None => values.first().copied().unwrap_or_default(),
        }
    }
}

const PRODUCERS: [Producer; 2] = [Producer::Honest, Producer::Selfish];

const CATEGORIES: [RewardCategory; 3] =
    [RewardCategory::Mined, RewardCategory::Nephew, RewardCategory::Uncle];

/// Type of column that can appear in a data table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum Column {
    // Variant order determines the order of columns in results tables
    RunId,
    Strategy(Producer),
    Power(Producer),
    PowerFunction(Producer, NamedFn<f64, f64>),
    Constant(NamedFn<(), f64>),
    AverageOf(Average),
    ChainLength,
    BlocksPublished,
    Dropped,
    TotalReward,
    PoolReward(Producer),
    Category(Producer, RewardCategory),
    Share(Producer),
}

/// Value which corresponds to a [`Column`].
#[derive(Debug, Clone, PartialEq)]
enum ColumnValue {
    Text(String),
    Int(usize),
    Power(PowerValue),
    Float(f64),
}

impl Column {
    /// Value of a column which changes between repeated runs.
    fn metric(&self, output: &SimulationOutput) -> Option<f64> {
        let tots = &output.totals;
        let value = match self {
            Self::ChainLength => output.chain.len() as f64,
            Self::BlocksPublished => output.published_total() as f64,
            Self::Dropped => output.dropped as f64,
            Self::TotalReward => tots.total,
            Self::PoolReward(producer) => tots.total_of(*producer),
            Self::Share(producer) => tots.share_of(*producer),
            Self::Category(producer, category) => {
                match (producer, category) {
                    (Producer::Honest, RewardCategory::Mined) => tots.mined_honest,
                    (Producer::Honest, RewardCategory::Nephew) => tots.nephew_honest,
                    (Producer::Honest, RewardCategory::Uncle) => tots.uncle_honest,
                    (Producer::Selfish, RewardCategory::Mined) => tots.mined_selfish,
                    (Producer::Selfish, RewardCategory::Nephew) => tots.nephew_selfish,
                    (Producer::Selfish, RewardCategory::Uncle) => tots.uncle_selfish,
                }
            }
            _ => return None,
        };

        Some(value)
    }

    fn value(&self, output: &SimulationOutput) -> ColumnValue {
        if let Some(value) = self.metric(output) {
            return match self {
                Self::ChainLength | Self::BlocksPublished | Self::Dropped => {
                    ColumnValue::Int(value as usize)
                }
                _ => ColumnValue::Float(value),
            };
        }

        match self {
            Self::RunId => ColumnValue::Int(output.run_id),
            Self::Strategy(producer) => {
                ColumnValue::Text(output.strategy_of(*producer).to_string())
            }
            Self::Power(producer) => {
                ColumnValue::Power(output.split.power_of(*producer))
            }
            Self::PowerFunction(producer, func) => {
                ColumnValue::Float(func.call(output.split.fraction_of(*producer)))
            }
            Self::Constant(func) => ColumnValue::Float(func.call(())),
            Self::AverageOf(_) => ColumnValue::Int(1),
            _ => unreachable!("metric columns are handled above"),
        }
    }

    fn average_value(
        &self,
        method: Average,
        outputs: &[SimulationOutput],
    ) -> ColumnValue {
        if let Self::AverageOf(_) = self {
            return ColumnValue::Int(outputs.len());
        }

        let values: Option<Vec<f64>> =
            outputs.iter().map(|output| self.metric(output)).collect();

        match values {
            Some(values) => ColumnValue::Float(method.apply(values)),
            None => self.value(&outputs[0]),
        }
    }
}

impl Display for Column {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RunId => write!(f, "Run"),
            Self::Strategy(producer) => write!(f, "{} Strategy", producer),
            Self::Power(producer) => write!(f, "{} Power", producer),
            Self::PowerFunction(_, func) => write!(f, "{}", func.name()),
            Self::Constant(func) => write!(f, "{}", func.name()),
            Self::AverageOf(method) => match method {
                Average::Mean => write!(f, "Mean Of"),
                Average::Median => write!(f, "Median Of"),
                Average::Max => write!(f, "Max Of"),
                Average::Min => write!(f, "Min Of"),
                Average::None => write!(f, "Runs"),
            },
            Self::ChainLength => write!(f, "Chain Length"),
            Self::BlocksPublished => write!(f, "Blocks Published"),
            Self::Dropped => write!(f, "Blocks Dropped"),
            Self::TotalReward => write!(f, "Total Reward"),
            Self::PoolReward(producer) => write!(f, "{} Reward", producer),
            Self::Category(producer, category) => {
                write!(f, "{} {:?} Reward", producer, category)
            }
            Self::Share(producer) => write!(f, "{} Share", producer),
        }
    }
}

impl Display for ColumnValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => write!(f, "{}", text),
            Self::Int(num) => write!(f, "{}", num),
            Self::Power(power) => write!(f, "{}", power),
            Self::Float(value) => {
                write!(f, "{:.1$}", value, FLOAT_PRECISION_DIGITS)
            }
        }
    }
}

/// Human-readable dump of a chain, one canonical block per line.
///
/// ```
/// use uncle_sim::{blockchain::Chain, results::ChainDump};
///
/// let chain = Chain::default();
/// let dump = ChainDump(&chain).to_string();
/// assert!(dump.starts_with("id: 0\tparent: -\tdepth: 0\tselfish: false"));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ChainDump<'a>(pub &'a Chain);

impl Display for ChainDump<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (i, block) in self.0.blocks().iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", block)?;
        }

        Ok(())
    }
}

/// Returns the ideal selfish mining revenue from Eyal and Sirer's paper as a
/// function of the selfish pool's fraction of hash power, where `gamma` is
/// the fraction of honest power which mines on the selfish branch during a
/// tie. Can be used as input to [`ResultsBuilder::mining_power_func`].
pub fn selfish_revenue(gamma: f64) -> impl Fn(f64) -> f64 {
    move |a: f64| -> f64 {
        (a * (1.0 - a).powi(2) * (4.0 * a + gamma * (1.0 - 2.0 * a))
            - a.powi(3))
            / (1.0 - a * (1.0 + a * (2.0 - a)))
    }
}
