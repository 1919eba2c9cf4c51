/*!

This is the long-form manual for `approval_voting` and `bltally`.

## Encoded votes

Each vote is the decimal text of a non-negative integer. The digits are cut
into fixed-width fields, each field being the 1-based position of a selected
answer. The width is the number of digits of `number of answers + 2`: with 3
answers, fields have 1 digit; with 8 to 97 answers, fields have 2 digits.

The text is padded with zeros on the left to a multiple of the field width
before being cut. With 3 answers:

| vote  | selection              |
|-------|------------------------|
| `12`  | answers 1 and 2        |
| `21`  | answers 2 and 1        |
| `3`   | answer 3               |
| `0`   | dropped (blank vote)   |
| `44`  | dropped (no answer 4)  |
| `33`  | dropped (duplicate)    |

Votes that select fewer answers than the minimum of the question, or more than
its maximum, are dropped as well. Dropped votes are logged and counted by
reason, they are not counted as dirty ballots.

Two votes that select the same answers in a different order are the same
ballot.

## Ballot files

The ballots of a question are written in the BLT format before being counted:

```text
3 2
2 1 2 0
1 1 0
1 3 0
0
"Anna"
"Bob"
"Clara"
"Who should sit on the board?"
```

The first line holds the number of answers and the number of seats. Each
ballot line holds the number of voters who cast it, the identifiers of the
selected answers, and `0`. A line with a single `0` ends the ballots. The
answers follow, quoted, in the order of their identifiers, and then the quoted
question, with its newlines removed.

The ballot file is written to the `ballotsDirectory` of the configuration (the
temporary directory of the system by default), and removed as soon as the
question is counted.

## Input formats

The following formats are supported:
* `csv` Comma Separated Values: one row per voter, one column per question,
  in the order of the questions. Use `firstVoteRowIndex` (starting at 1) to
  skip a header. An empty cell means that the voter did not answer.
* `json` An array of voters, each voter being an array with one vote per
  question. Votes are numbers or strings; `null` means that the voter did not
  answer. Numbers keep all their digits, whatever their length.

## Configuration

```json
{
  "outputSettings": {
    "contestName": "Board election",
    "outputPath": "summary.json",
    "ballotsDirectory": "ballots"
  },
  "votesFile": { "provider": "csv", "filePath": "votes.csv", "firstVoteRowIndex": 2 },
  "engine": {
    "method": "Approval",
    "timeoutSeconds": 60,
    "tiebreakMode": "random",
    "randomSeed": "42"
  },
  "externalEngines": [
    { "name": "stv", "program": "/usr/local/bin/stv-count", "args": ["--quiet"] }
  ],
  "questions": [
    {
      "question": "Who should sit on the board?",
      "min": 1,
      "max": 2,
      "num_seats": 2,
      "answers": [{ "value": "Anna" }, { "value": "Bob" }, { "value": "Clara" }]
    }
  ]
}
```

Relative paths are relative to the directory of the configuration file. The
command line options `--input`, `--input-type`, `--out`, `--method` and
`--timeout` override the configuration.

## Engines

### `Approval`

The built-in engine. Each answer receives the count of every ballot that
selects it. Identifiers out of range and repeated identifiers are ignored,
ballots left without a selection are not counted. The answers with the most
votes win, ties are broken by:
* `useCandidateOrder` (default) the answer listed first wins
* `random` a SHA-256 digest of `randomSeed` and the value of the answer

### External engines

An external engine is a program called as:

```text
program [args...] <ballot file> <number of seats> <report file>
```

It must write its report to the report file, in JSON:

```json
{
  "ballots_count": 5,
  "dirty_ballots_count": 7,
  "winners": ["Clara", "Anna"],
  "answers": { "Anna": 4, "Bob": 2, "Clara": 2 }
}
```

A non-zero exit status fails the tally, with the standard error of the program
as the diagnostic. A program still running after `timeoutSeconds` is killed.

## Output

The summary holds, for each question, the number of counted votes, the number
of dirty votes (`dirty_ballots_count - ballots_count`), the winners in the
order reported by the engine, and the count and percentage of each answer. The
percentages are relative to the sum of the counts of all the answers. The raw
report of the engine is kept under `tally_log`.

*/
