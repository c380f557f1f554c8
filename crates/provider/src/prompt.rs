//! Prompt construction for the analysis call
//!
//! Both adapters send the same instruction: the user-supplied property
//! metadata, the fixed auction-analysis checklist, and output-format
//! instructions demanding a JSON block between `JSON_START`/`JSON_END` and
//! an HTML report between `HTML_START`/`HTML_END`. The PDFs travel as
//! binary parts of the request, not inside the prompt.

use chrono::Local;

use crate::AnalysisRequest;
use crate::extract::{HTML_END, HTML_START, JSON_END, JSON_START};

/// The fixed checklist the analyst persona must work through, in order.
/// Items the notice does not answer must be reported as
/// "Não consta essa informação" rather than invented.
const CHECKLIST: &str = r#"Você é um experiente analista de leilão de imóveis, especializado em análise de edital e de matrícula, concluindo se este é um bom negócio para o investidor ou não. Quando não conseguir compreender ou ler um documento, informe essa dificuldade e nunca invente informações. A análise deve ser referente ao imóvel em específico, ignorando eventuais outros imóveis listados no mesmo edital. Se a unidade pretendida for um apartamento, verifique se o leilão inclui a vaga de garagem e, caso o edital não a discrimine, verifique na matrícula se ela consta junto do imóvel.

Indique as seguintes informações do edital, respondendo "Não consta essa informação" quando não especificado:
1. Data e valor do Primeiro e do Segundo Leilão;
2. Descrição detalhada do imóvel (casa, apartamento, vaga de garagem, terreno, lote rural ou urbano);
3. O valor de avaliação do imóvel que consta no edital;
4. A data da avaliação deste imóvel;
5. É um leilão de propriedade, de direitos ou de fração ideal?
6. A forma de pagamento do lance;
7. As dívidas do imóvel irão sub-rogar no preço, estão quitadas ou serão pagas pelo arrematante?
8. Quando for mencionado o artigo 130 do CTN, transcreva o trecho do edital indicando onde a informação pode ser localizada;
9. Quando for mencionado o artigo 908 do CPC, transcreva o trecho do edital indicando onde a informação pode ser localizada;
10. Há possibilidade de desistência ou arrependimento (risco de evicção)?
11. Qual o percentual de comissão a ser paga pelo arrematante ao leiloeiro?
12. O imóvel está ocupado? Quem é o ocupante e ele é o mesmo executado?
13. O imóvel é adquirido ad corpus?
14. Há dívidas mencionadas no edital e serão de responsabilidade do arrematante?
15. Há informação sobre o imóvel ser foreiro?
16. O imóvel tem habite-se?

Quando a matrícula tiver sido anexada, verifique também:
1. Existe ônus sobre o imóvel (indisponibilidade, penhora, alienação fiduciária, hipoteca, sequestro ou outra prenotação), indicando a data da averbação, o credor, o executado e a localização da informação ("AV" ou "R");
2. Havendo ônus, informe se houve cancelamento, com data e número da averbação;
3. Quem é o último proprietário que consta na matrícula e se é o mesmo devedor da ação mencionada no edital;
4. O imóvel foi consolidado? Se sim, há menos de 5 anos? Acima de 5 anos (ou 10 anos para mais de 250 m² construídos), inclua a ressalva sobre eventual usucapião;
5. Havendo averbação de consolidação, transcreva como foi feita a intimação pelo oficial (pessoal ou por edital, e o motivo quando constar);
6. Há leilões negativos informados na matrícula?
7. A matrícula indica vaga de garagem?

Depois, estime o valor de mercado pesquisando o valor do m² na região do imóvel, calcule o valor do imóvel analisado e indique o valor máximo de lance, que não deve superar 60% do valor de mercado apurado. Compare com o lance mínimo e diga se é uma boa oportunidade de arrematação. Por fim, elabore um parecer jurídico sucinto (até 500 palavras) considerando margem de lucro, custos assumidos pelo arrematante, valor máximo de lance e liquidez, concluindo com "Aprovado", "aquisição de risco" ou reprovação por inviabilidade financeira."#;

/// Section headings the HTML report must contain, in order.
const HTML_SECTIONS: &[&str] = &[
    "Recomendação",
    "Riscos Identificados",
    "Oportunidades",
    "Sumário Executivo",
    "Detalhes do Imóvel",
    "Detalhes do Leilão",
    "Análise de Mercado",
    "Análise Jurídica",
    "Análise Financeira",
    "Considerações de Investimento",
    "Comparativo com Mercado",
    "Potencial de Valorização",
    "Recomendações de Ação",
];

/// Build the full analysis prompt for one request.
pub fn build_prompt(request: &AnalysisRequest) -> String {
    let hoje = Local::now().format("%d/%m/%Y");
    let sections = HTML_SECTIONS
        .iter()
        .map(|s| format!("      <div class=\"section\"><div class=\"section-title\">{s}</div><!-- conteúdo detalhado --></div>"))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"Você é um especialista em análise de leilões imobiliários no Brasil. Analise o edital de leilão anexado e forneça uma análise detalhada.

Informações do imóvel:
- Tipo: {tipo}
- Matrícula: {matricula}
- Estado: {estado}
- Cidade: {cidade}

{checklist}

Instruções adicionais do usuário:
{instrucoes}

Sua tarefa consiste em duas partes:

1. Primeiro, forneça uma análise resumida com os dados a seguir em formato JSON:
{{
  "recomendacao": "string com recomendação clara",
  "riscos": ["array de strings com riscos identificados"],
  "oportunidades": ["array de strings com oportunidades identificadas"],
  "valorEstimado": "string com valor estimado",
  "detalhesImovel": {{
    "endereco": "string com endereço completo",
    "area": "string com área do imóvel",
    "descricao": "string com descrição detalhada"
  }},
  "detalhesLeilao": {{
    "dataLeilao": "string com data do leilão",
    "valorInicial": "string com valor inicial",
    "incrementoMinimo": "string com incremento mínimo",
    "formasPagamento": ["array de strings com formas de pagamento"]
  }},
  "analiseJuridica": "string com análise jurídica detalhada",
  "analiseFinanceira": "string com análise financeira detalhada"
}}

2. Segundo, gere um documento HTML completo, em pt-BR, com uma análise muito mais detalhada e profunda. Use o cabeçalho "Relatório gerado em {hoje}" e inclua, nesta ordem, as seções abaixo, cada uma com conteúdo detalhado:

    <!DOCTYPE html>
    <html lang="pt-BR">
    <head><meta charset="UTF-8"><title>Análise de Leilão</title></head>
    <body>
{sections}
    </body>
    </html>

Sua resposta deve ser estruturada da seguinte forma:

1. Primeiro forneça o objeto JSON com a análise resumida (entre delimitadores {json_start} e {json_end})
2. Em seguida, forneça o HTML completo com a análise detalhada (entre delimitadores {html_start} e {html_end})
"#,
        tipo = or_not_informed(&request.tipo_imovel, "Não informado"),
        matricula = or_not_informed(&request.matricula, "Não informada"),
        estado = or_not_informed(&request.estado, "Não informado"),
        cidade = or_not_informed(&request.cidade, "Não informada"),
        checklist = CHECKLIST,
        instrucoes = or_not_informed(&request.instrucoes, "Não há instruções adicionais."),
        hoje = hoje,
        sections = sections,
        json_start = JSON_START,
        json_end = JSON_END,
        html_start = HTML_START,
        html_end = HTML_END,
    )
}

fn or_not_informed<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() { fallback } else { value }
}
